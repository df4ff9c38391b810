use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::{PipelineError, Result};
use crate::models::{FaceJob, FaceKey};
use crate::pipeline::codec;
use crate::queue::JobReceiver;
use crate::AppState;

/// Crops one face out of its source photo and stores it as a new unlabeled crop.
///
/// Every call mints a fresh key, so a redelivered job yields a second,
/// independent crop rather than overwriting the first.
pub async fn extract(state: &AppState, job: &FaceJob) -> Result<FaceKey> {
    let bytes = state.photos.get(&job.photo_id).await?;
    let rect = job.rectangle;
    let quality = state.jpeg_quality;

    let jpeg = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        let image = codec::decode(&bytes)?;
        let face = codec::crop(&image, rect)?;
        codec::encode_jpeg(&face, quality)
    })
    .await
    .map_err(|e| PipelineError::Decode(format!("crop task failed: {e}")))??;

    let key = FaceKey::unlabeled(&job.photo_id)?;
    state.faces.put(&key.to_string(), Bytes::from(jpeg)).await?;
    state.stats.inc_crops_extracted();
    info!(photo_id = %job.photo_id, rect = %rect, key = %key, "face crop stored");
    Ok(key)
}

/// Parses one queue body and extracts it.
pub async fn handle_message(state: &AppState, body: &str) -> Result<FaceKey> {
    let job = FaceJob::from_message(body)?;
    extract(state, &job).await
}

/// How often a job is redelivered after an infrastructure failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deliveries per job, the first one included.
    pub max_attempts: u32,
    /// Delay before the first redelivery; doubles on each further one.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5, backoff: Duration::from_millis(500) }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

/// Processes one delivery, redelivering it while the failure is transient.
async fn deliver(state: &AppState, worker: usize, body: &str, retry: RetryPolicy) {
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match handle_message(state, body).await {
            Ok(_) => return,
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = retry.delay(attempt);
                state.stats.inc_jobs_retried();
                warn!(worker, attempt, ?delay, "face job failed, redelivering: {}", e);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) if e.is_transient() => {
                state.stats.inc_jobs_dropped();
                error!(worker, attempt, body = %body, "face job dropped after repeated infrastructure failures: {}", e);
                return;
            }
            Err(e) => {
                state.stats.inc_jobs_dropped();
                warn!(worker, body = %body, "face job dropped: {}", e);
                return;
            }
        }
    }
}

/// Consumes the work queue with `n` workers. Terminal failures are logged and
/// dropped; transient ones are redelivered up to `retry.max_attempts` times.
/// A failing job never fails the jobs around it.
pub fn start_workers(n: usize, mut rx: JobReceiver, state: Arc<AppState>, retry: RetryPolicy) {
    let n = n.max(1);
    let mut worker_txs = Vec::with_capacity(n);
    let mut worker_rxs = Vec::with_capacity(n);
    for _ in 0..n {
        let (wt, wr) = mpsc::channel::<String>(256);
        worker_txs.push(wt);
        worker_rxs.push(wr);
    }

    // round-robin distributor; exits when the queue closes
    tokio::spawn(async move {
        let mut idx = 0;
        while let Some(body) = rx.recv().await {
            if worker_txs[idx % worker_txs.len()].send(body).await.is_err() {
                break;
            }
            idx += 1;
        }
    });

    for (worker, mut worker_rx) in worker_rxs.into_iter().enumerate() {
        let state = state.clone();
        tokio::spawn(async move {
            while let Some(body) = worker_rx.recv().await {
                deliver(&state, worker, &body, retry).await;
            }
        });
    }
}
