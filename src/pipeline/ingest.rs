use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::models::{FaceJob, Rect};
use crate::pipeline::codec;
use crate::AppState;

// Rectangles buffered between the detector thread and the enqueuer.
const DETECTION_BUFFER: usize = 64;

/// Outcome of one ingestion. Fan-out is best effort: `enqueued < detected`
/// means some jobs were lost and is reported, not rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanOut {
    pub photo_id: String,
    pub detected: usize,
    pub enqueued: usize,
    pub failed: usize,
}

impl FanOut {
    fn new(photo_id: &str) -> Self {
        Self { photo_id: photo_id.to_string(), detected: 0, enqueued: 0, failed: 0 }
    }

    pub fn is_complete(&self) -> bool {
        self.enqueued == self.detected
    }
}

/// Content-addressed photo id: identical uploads map to the same object.
pub fn photo_id_for(bytes: &[u8]) -> String {
    format!("{}.jpeg", hex::encode(Sha256::digest(bytes)))
}

/// Upload hook: stores the photo as received and returns its id.
pub async fn store_photo(state: &AppState, bytes: Bytes) -> Result<String> {
    if bytes.is_empty() {
        return Err(PipelineError::Decode("empty upload".into()));
    }
    let photo_id = photo_id_for(&bytes);
    let size = bytes.len();
    state.photos.put(&photo_id, bytes).await?;
    state.stats.inc_photos_stored();
    info!(photo_id = %photo_id, bytes = size, "photo stored");
    Ok(photo_id)
}

/// Stores the photo, then runs ingestion on it the way the storage trigger would.
pub async fn upload_and_ingest(state: &AppState, bytes: Bytes) -> Result<FanOut> {
    let photo_id = store_photo(state, bytes).await?;
    ingest(state, &photo_id).await
}

/// Detects faces in a stored photo and enqueues one extraction job per face.
///
/// Detection runs on a blocking thread and hands rectangles over as they are
/// produced. If every enqueue fails the whole invocation is reported as
/// `QueueUnavailable` so the trigger redelivers it.
pub async fn ingest(state: &AppState, photo_id: &str) -> Result<FanOut> {
    let bytes = state.photos.get(photo_id).await?;
    let detector = state.detector.clone();
    let (tx, mut rx) = mpsc::channel::<Rect>(DETECTION_BUFFER);

    let detection = tokio::task::spawn_blocking(move || -> Result<()> {
        let image = codec::decode(&bytes)?;
        for rect in detector.detect(&image)? {
            if tx.blocking_send(rect).is_err() {
                break;
            }
        }
        Ok(())
    });

    let mut report = FanOut::new(photo_id);
    while let Some(rect) = rx.recv().await {
        report.detected += 1;
        let sent = match FaceJob::new(photo_id, rect).to_message() {
            Ok(body) => state.queue.send(body).await,
            Err(e) => Err(e),
        };
        match sent {
            Ok(()) => report.enqueued += 1,
            Err(e) => {
                report.failed += 1;
                warn!(photo_id = %photo_id, rect = %rect, "failed to enqueue face job: {}", e);
            }
        }
    }

    state.stats.add_faces_detected(report.detected as u64);
    state.stats.add_jobs_enqueued(report.enqueued as u64);
    state.stats.add_enqueue_failures(report.failed as u64);

    match detection.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e),
        Err(e) => return Err(PipelineError::Detection(format!("detection task failed: {e}"))),
    }

    if report.detected == 0 {
        info!(photo_id = %photo_id, "no faces detected");
    } else if report.enqueued == 0 {
        return Err(PipelineError::QueueUnavailable(format!(
            "none of {} face jobs for {} could be enqueued",
            report.detected, photo_id
        )));
    } else if !report.is_complete() {
        warn!(
            photo_id = %photo_id,
            detected = report.detected,
            enqueued = report.enqueued,
            "partial fan-out: some face jobs were not enqueued"
        );
    } else {
        info!(photo_id = %photo_id, faces = report.detected, "face jobs enqueued");
    }
    state.stats.inc_photos_ingested();
    Ok(report)
}
