use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use facetag_backend::pipeline::{extract, Detector};
use facetag_backend::queue::{ChannelQueue, TimeoutQueue};
use facetag_backend::store::{FsBlobStore, TimeoutStore};
use facetag_backend::utils::config::Config;
use facetag_backend::utils::logging;
use facetag_backend::AppState;
use tracing::info;

#[cfg(feature = "facial-recognition")]
async fn load_detector(cfg: &Config) -> anyhow::Result<Arc<dyn Detector>> {
    let detector = facetag_backend::pipeline::scrfd::ScrfdDetector::load(
        &cfg.models,
        cfg.detector.clone(),
        cfg.auto_download,
    )
    .await
    .context("Failed to load face detector")?;
    Ok(Arc::new(detector))
}

#[cfg(not(feature = "facial-recognition"))]
async fn load_detector(_cfg: &Config) -> anyhow::Result<Arc<dyn Detector>> {
    anyhow::bail!("built without the facial-recognition feature; no face detector available")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cfg = Config::from_env();
    info!(data = ?cfg.data, detector = ?cfg.detector, "starting facetag backend");

    let photos = FsBlobStore::open(cfg.photos_dir())
        .with_context(|| format!("Failed to open photo bucket at {:?}", cfg.photos_dir()))?;
    let faces = FsBlobStore::open(cfg.faces_dir())
        .with_context(|| format!("Failed to open face bucket at {:?}", cfg.faces_dir()))?;
    let (queue, jobs) = ChannelQueue::new(cfg.queue_capacity);
    let depth = queue.depth_gauge();
    let detector = load_detector(&cfg).await?;

    let state = AppState::new(
        Arc::new(TimeoutStore::new(photos, cfg.store_timeout)),
        Arc::new(TimeoutStore::new(faces, cfg.store_timeout)),
        Arc::new(TimeoutQueue::new(queue, cfg.queue_timeout)),
        detector,
    )
    .with_jpeg_quality(cfg.jpeg_quality);
    state.stats.track_queue_depth(depth);
    let state = Arc::new(state);

    extract::start_workers(cfg.extract_threads, jobs, state.clone(), cfg.extract_retry);

    let app = facetag_backend::api::routes::router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
