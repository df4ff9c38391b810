pub mod fs;
pub mod memory;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{PipelineError, Result};

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;

/// Object storage primitive: one bucket, flat keys.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<()>;

    /// `NotFound` when the key is absent.
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Keys starting with `prefix`, sorted ascending.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Overwrites `to`; `NotFound` when `from` is absent.
    async fn copy(&self, from: &str, to: &str) -> Result<()>;

    /// Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Bounds every call of the wrapped store; an elapsed call is `StoreUnavailable`.
pub struct TimeoutStore<S> {
    inner: S,
    limit: Duration,
}

impl<S: BlobStore> TimeoutStore<S> {
    pub fn new(inner: S, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn bounded<T>(&self, op: &str, key: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(res) => res,
            Err(_) => Err(PipelineError::StoreUnavailable(format!(
                "{op} {key:?} timed out after {:?}",
                self.limit
            ))),
        }
    }
}

#[async_trait]
impl<S: BlobStore> BlobStore for TimeoutStore<S> {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<()> {
        self.bounded("put", key, self.inner.put(key, bytes)).await
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.bounded("get", key, self.inner.get(key)).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.bounded("list", prefix, self.inner.list(prefix)).await
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        self.bounded("copy", from, self.inner.copy(from, to)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.bounded("delete", key, self.inner.delete(key)).await
    }
}

/// Longest key, in UTF-8 bytes, that every supported bucket can hold as a
/// single file name.
pub const MAX_KEY_BYTES: usize = 255;

/// Rejects keys that cannot be a flat object name.
pub fn validate_key(key: &str) -> Result<()> {
    if key.len() > MAX_KEY_BYTES {
        return Err(PipelineError::InvalidKey(format!(
            "object key is {} bytes, limit is {MAX_KEY_BYTES}",
            key.len()
        )));
    }
    let bad = key.is_empty()
        || key.starts_with('.')
        || key.contains(['/', '\\', '\0']);
    if bad {
        return Err(PipelineError::InvalidKey(format!("unusable object key {key:?}")));
    }
    Ok(())
}
