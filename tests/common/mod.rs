#![allow(dead_code)]

pub mod fixtures;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use facetag_backend::error::{PipelineError, Result};
use facetag_backend::models::{FaceKey, Rect};
use facetag_backend::pipeline::{extract, Detections, Detector, RetryPolicy};
use facetag_backend::queue::{ChannelQueue, JobReceiver, WorkQueue};
use facetag_backend::store::{BlobStore, MemoryBlobStore};
use facetag_backend::AppState;
use bytes::Bytes;
use image::DynamicImage;
use tokio::net::TcpListener;

/// Detector that reports the same rectangles for every image.
pub struct ScriptedDetector {
    pub rects: Vec<Rect>,
}

impl Detector for ScriptedDetector {
    fn detect<'a>(&'a self, _image: &'a DynamicImage) -> Result<Detections<'a>> {
        Ok(Box::new(self.rects.iter().copied()))
    }
}

/// Queue that rejects its first `fail_first` sends, then forwards to `inner`.
pub struct FlakyQueue {
    pub inner: ChannelQueue,
    pub fail_first: AtomicUsize,
}

#[async_trait]
impl WorkQueue for FlakyQueue {
    async fn send(&self, body: String) -> Result<()> {
        if take_failure(&self.fail_first) {
            return Err(PipelineError::QueueUnavailable("injected failure".into()));
        }
        self.inner.send(body).await
    }
}

/// Store over a shared in-memory bucket whose first `fail_puts` puts and
/// first `fail_deletes` deletes fail as unavailable.
pub struct FlakyStore {
    pub inner: Arc<MemoryBlobStore>,
    pub fail_puts: AtomicUsize,
    pub fail_deletes: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryBlobStore>, fail_puts: usize, fail_deletes: usize) -> Self {
        Self {
            inner,
            fail_puts: AtomicUsize::new(fail_puts),
            fail_deletes: AtomicUsize::new(fail_deletes),
        }
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl BlobStore for FlakyStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<()> {
        if take_failure(&self.fail_puts) {
            return Err(PipelineError::StoreUnavailable(format!("injected put failure for {key}")));
        }
        self.inner.put(key, bytes).await
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.inner.get(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        self.inner.copy(from, to).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if take_failure(&self.fail_deletes) {
            return Err(PipelineError::StoreUnavailable(format!("injected delete failure for {key}")));
        }
        self.inner.delete(key).await
    }
}

/// Redelivers quickly so retry tests stay fast.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy { max_attempts: 3, backoff: std::time::Duration::from_millis(10) }
}

pub fn rect(x: u32, y: u32, w: u32, h: u32) -> Rect {
    Rect::new(x, y, w, h).unwrap()
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub photos: Arc<MemoryBlobStore>,
    pub faces: Arc<MemoryBlobStore>,
    pub jobs: JobReceiver,
}

/// In-memory buckets, a channel queue and a scripted detector.
pub fn harness(rects: Vec<Rect>) -> Harness {
    let (queue, jobs) = ChannelQueue::new(64);
    build(rects, Arc::new(queue), jobs)
}

/// Like `harness`, but the first `fail_first` enqueues fail.
pub fn flaky_harness(rects: Vec<Rect>, fail_first: usize) -> Harness {
    let (inner, jobs) = ChannelQueue::new(64);
    let queue = FlakyQueue { inner, fail_first: AtomicUsize::new(fail_first) };
    build(rects, Arc::new(queue), jobs)
}

/// Like `harness`, but the first `fail_puts` writes to the faces bucket fail.
pub fn flaky_faces_harness(rects: Vec<Rect>, fail_puts: usize) -> Harness {
    let (queue, jobs) = ChannelQueue::new(64);
    let faces = Arc::new(MemoryBlobStore::new());
    let store = Arc::new(FlakyStore::new(faces.clone(), fail_puts, 0));
    build_with(rects, Arc::new(queue), jobs, store, faces)
}

fn build(rects: Vec<Rect>, queue: Arc<dyn WorkQueue>, jobs: JobReceiver) -> Harness {
    let faces = Arc::new(MemoryBlobStore::new());
    build_with(rects, queue, jobs, faces.clone(), faces)
}

fn build_with(
    rects: Vec<Rect>,
    queue: Arc<dyn WorkQueue>,
    jobs: JobReceiver,
    faces_store: Arc<dyn BlobStore>,
    faces: Arc<MemoryBlobStore>,
) -> Harness {
    let photos = Arc::new(MemoryBlobStore::new());
    let state = AppState::new(
        photos.clone(),
        faces_store,
        queue,
        Arc::new(ScriptedDetector { rects }),
    );
    Harness { state: Arc::new(state), photos, faces, jobs }
}

impl Harness {
    /// Runs every queued job through extraction, in order.
    pub async fn drain(&mut self) -> Vec<Result<FaceKey>> {
        let mut out = Vec::new();
        while let Some(body) = self.jobs.try_recv() {
            out.push(extract::handle_message(&self.state, &body).await);
        }
        out
    }

    /// Queued job bodies, without running them.
    pub fn take_jobs(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(body) = self.jobs.try_recv() {
            out.push(body);
        }
        out
    }
}

/// Polls `condition` until it holds or the attempts run out.
pub async fn wait_for_condition<F>(mut condition: F, max_attempts: usize, delay_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    use tokio::time::{sleep, Duration};
    for _ in 0..max_attempts {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(delay_ms)).await;
    }
    condition()
}

/// Serves the router on an ephemeral port.
pub async fn serve(state: Arc<AppState>) -> TestClient {
    let app = facetag_backend::api::routes::router(state);
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    TestClient::new(port)
}

/// Helper to make HTTP requests to test server
pub struct TestClient {
    pub base_url: String,
    pub client: reqwest::Client,
}

impl TestClient {
    pub fn new(port: u16) -> Self {
        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            client: reqwest::Client::new(),
        }
    }

    pub async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client.get(&format!("{}{}", self.base_url, path)).send().await
    }

    pub async fn post(&self, path: &str, json: &serde_json::Value) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(&format!("{}{}", self.base_url, path))
            .json(json)
            .send()
            .await
    }

    pub async fn post_bytes(&self, path: &str, body: bytes::Bytes) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(&format!("{}{}", self.base_url, path))
            .header("content-type", "image/jpeg")
            .body(body)
            .send()
            .await
    }
}
