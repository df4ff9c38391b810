use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use super::{validate_key, BlobStore};
use crate::error::{PipelineError, Result};

/// A bucket backed by one directory; each object is a file named by its key.
///
/// Writes land in a hidden temporary file first and are renamed into place,
/// so a concurrent reader or lister never observes a partial object.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn open(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn temp_path(&self) -> PathBuf {
        self.root.join(format!(".tmp-{}", Uuid::new_v4().simple()))
    }

    async fn publish(&self, tmp: &Path, dst: &Path) -> Result<()> {
        if let Err(e) = tokio::fs::rename(tmp, dst).await {
            if let Err(rm_err) = tokio::fs::remove_file(tmp).await {
                warn!("Failed to clean up temporary object {:?}: {}", tmp, rm_err);
            }
            return Err(unavailable("rename", dst, e));
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
const ENAMETOOLONG: i32 = 36;
#[cfg(not(target_os = "linux"))]
const ENAMETOOLONG: i32 = 63;

/// The filesystem refused the name itself; retrying cannot help.
fn rejects_name(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::InvalidInput || (cfg!(unix) && e.raw_os_error() == Some(ENAMETOOLONG))
}

fn unavailable(op: &str, path: &Path, e: std::io::Error) -> PipelineError {
    if rejects_name(&e) {
        return PipelineError::InvalidKey(format!("{op} {:?}: {e}", path));
    }
    PipelineError::StoreUnavailable(format!("{op} {:?}: {e}", path))
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<()> {
        let dst = self.path_for(key)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| unavailable("write", &tmp, e))?;
        self.publish(&tmp, &dst).await
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(PipelineError::NotFound(key.to_string())),
            Err(e) => Err(unavailable("read", &path, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| unavailable("list", &self.root, e))?;
        let mut keys = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| unavailable("list", &self.root, e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') || !name.starts_with(prefix) {
                continue;
            }
            keys.push(name);
        }
        keys.sort();
        Ok(keys)
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let src = self.path_for(from)?;
        let dst = self.path_for(to)?;
        let tmp = self.temp_path();
        match tokio::fs::copy(&src, &tmp).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PipelineError::NotFound(from.to_string()))
            }
            Err(e) => return Err(unavailable("copy", &src, e)),
        }
        self.publish(&tmp, &dst).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(unavailable("delete", &path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FsBlobStore) {
        let tmp = TempDir::new().unwrap();
        let store = FsBlobStore::open(tmp.path().join("faces")).unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn put_get_round_trip() {
        let (_tmp, store) = setup();
        store.put("P1.jpeg", Bytes::from_static(b"jpeg")).await.unwrap();
        assert_eq!(store.get("P1.jpeg").await.unwrap(), Bytes::from_static(b"jpeg"));
        assert!(store.get("P2.jpeg").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn list_skips_temporaries_and_sorts() {
        let (_tmp, store) = setup();
        std::fs::write(store.root().join(".tmp-leftover"), b"partial").unwrap();
        for key in ["unlabeled-b___P1", "alice-a___P1", "unlabeled-a___P2"] {
            store.put(key, Bytes::from_static(b"x")).await.unwrap();
        }
        assert_eq!(
            store.list("unlabeled-").await.unwrap(),
            vec!["unlabeled-a___P2", "unlabeled-b___P1"]
        );
        assert_eq!(store.list("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn copy_then_delete_moves_object() {
        let (_tmp, store) = setup();
        store.put("old", Bytes::from_static(b"face")).await.unwrap();
        store.copy("old", "new").await.unwrap();
        store.delete("old").await.unwrap();
        assert_eq!(store.get("new").await.unwrap(), Bytes::from_static(b"face"));
        assert_eq!(store.list("").await.unwrap(), vec!["new"]);
    }

    #[tokio::test]
    async fn missing_objects() {
        let (_tmp, store) = setup();
        assert!(store.copy("ghost", "x").await.unwrap_err().is_not_found());
        store.delete("ghost").await.unwrap();
    }

    #[tokio::test]
    async fn rejects_path_like_keys() {
        let (_tmp, store) = setup();
        let err = store.put("../escape", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn over_long_keys_are_invalid_not_transient() {
        let (_tmp, store) = setup();
        let key = format!("{}-{}___P1", "字".repeat(64), "1".repeat(32));
        let err = store.put(&key, Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidKey(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn name_errors_from_the_filesystem_are_invalid_keys() {
        let err = unavailable("rename", Path::new("x"), std::io::Error::from_raw_os_error(ENAMETOOLONG));
        #[cfg(unix)]
        assert!(matches!(err, PipelineError::InvalidKey(_)));
        #[cfg(not(unix))]
        let _ = err;
        let err = unavailable("write", Path::new("x"), std::io::Error::from(ErrorKind::InvalidInput));
        assert!(matches!(err, PipelineError::InvalidKey(_)));
        let err = unavailable("write", Path::new("x"), std::io::Error::from(ErrorKind::PermissionDenied));
        assert!(err.is_transient());
    }
}
