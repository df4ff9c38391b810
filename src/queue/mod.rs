pub mod channel;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{PipelineError, Result};

pub use channel::{ChannelQueue, JobReceiver};

/// At-least-once message queue carrying serialized face jobs.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn send(&self, body: String) -> Result<()>;
}

/// Bounds every send of the wrapped queue; an elapsed send is `QueueUnavailable`.
pub struct TimeoutQueue<Q> {
    inner: Q,
    limit: Duration,
}

impl<Q: WorkQueue> TimeoutQueue<Q> {
    pub fn new(inner: Q, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl<Q: WorkQueue> WorkQueue for TimeoutQueue<Q> {
    async fn send(&self, body: String) -> Result<()> {
        match tokio::time::timeout(self.limit, self.inner.send(body)).await {
            Ok(res) => res,
            Err(_) => Err(PipelineError::QueueUnavailable(format!(
                "send timed out after {:?}",
                self.limit
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_queue_send_times_out() {
        let (queue, _rx) = ChannelQueue::new(1);
        let queue = TimeoutQueue::new(queue, Duration::from_millis(20));
        queue.send("first".into()).await.unwrap();
        let err = queue.send("second".into()).await.unwrap_err();
        assert!(matches!(err, PipelineError::QueueUnavailable(_)));
    }
}
