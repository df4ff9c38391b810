use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, Receiver, Sender};

use super::WorkQueue;
use crate::error::{PipelineError, Result};

/// Bounded in-process queue. Depth is tracked so `/metrics` can report backlog.
#[derive(Clone)]
pub struct ChannelQueue {
    tx: Sender<String>,
    depth: Arc<AtomicUsize>,
}

pub struct JobReceiver {
    rx: Receiver<String>,
    depth: Arc<AtomicUsize>,
}

impl ChannelQueue {
    pub fn new(capacity: usize) -> (ChannelQueue, JobReceiver) {
        let (tx, rx) = mpsc::channel::<String>(capacity.max(1));
        let depth = Arc::new(AtomicUsize::new(0));
        (
            ChannelQueue { tx, depth: depth.clone() },
            JobReceiver { rx, depth },
        )
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn depth_gauge(&self) -> Arc<AtomicUsize> {
        self.depth.clone()
    }
}

#[async_trait]
impl WorkQueue for ChannelQueue {
    async fn send(&self, body: String) -> Result<()> {
        let permit = self
            .tx
            .reserve()
            .await
            .map_err(|_| PipelineError::QueueUnavailable("queue consumer has shut down".into()))?;
        // counted before the message becomes visible to the consumer
        self.depth.fetch_add(1, Ordering::Relaxed);
        permit.send(body);
        Ok(())
    }
}

impl JobReceiver {
    pub async fn recv(&mut self) -> Option<String> {
        let body = self.rx.recv().await?;
        let _ = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| Some(d.saturating_sub(1)));
        Some(body)
    }

    /// Non-blocking receive, used by tests to drain what was enqueued.
    pub fn try_recv(&mut self) -> Option<String> {
        let body = self.rx.try_recv().ok()?;
        let _ = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| Some(d.saturating_sub(1)));
        Some(body)
    }
}
