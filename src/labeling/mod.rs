//! Identity state lives only in face crop keys; these operations read and
//! mutate it through prefix listing, copy and delete.
//!
//! Two operators renaming the same unlabeled crop at once can both win the
//! copy, leaving two named keys for one face. The store offers no conditional
//! write, so that race is accepted rather than locked against.

pub mod commands;

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::models::{FaceKey, Label};
use crate::store::BlobStore;

/// Parses listed keys, skipping anything that is not a well-formed face key.
async fn list_label(faces: &dyn BlobStore, label: &Label) -> Result<Vec<FaceKey>> {
    let keys = faces.list(&label.prefix()).await?;
    Ok(keys
        .iter()
        .filter_map(|raw| match FaceKey::parse(raw) {
            Ok(key) if key.label() == label => Some(key),
            Ok(_) => None,
            Err(e) => {
                warn!("skipping foreign object in faces bucket: {}", e);
                None
            }
        })
        .collect())
}

/// Lexicographically first unlabeled crop, or `None` when nothing is pending.
pub async fn next_unlabeled(faces: &dyn BlobStore) -> Result<Option<FaceKey>> {
    Ok(list_label(faces, &Label::Unlabeled).await?.into_iter().next())
}

pub async fn pending_count(faces: &dyn BlobStore) -> Result<usize> {
    Ok(list_label(faces, &Label::Unlabeled).await?.len())
}

/// Attaches `name` to the unlabeled crop `face_uuid`.
///
/// Copy happens before delete: a failure in between leaves the crop under both
/// keys, which a retry resolves, instead of losing it.
pub async fn rename(faces: &dyn BlobStore, face_uuid: &str, name: &str) -> Result<FaceKey> {
    let label = Label::named(name)?;
    let prefix = FaceKey::crop_prefix(&Label::Unlabeled, face_uuid)
        .map_err(|_| PipelineError::NotFound(format!("unlabeled face {face_uuid:?}")))?;
    let old = faces
        .list(&prefix)
        .await?
        .iter()
        .find_map(|raw| FaceKey::parse(raw).ok())
        .ok_or_else(|| PipelineError::NotFound(format!("unlabeled face {face_uuid}")))?;

    let new = old.relabeled(label);
    let (old_raw, new_raw) = (old.to_string(), new.to_string());
    faces.copy(&old_raw, &new_raw).await?;
    if let Err(e) = faces.delete(&old_raw).await {
        warn!(
            old = %old_raw,
            new = %new_raw,
            "renamed copy written but old key not removed; face is listed twice until retried: {}",
            e
        );
        return Err(e);
    }
    info!(face_uuid = %face_uuid, name = %new.label(), photo_id = %new.photo_id(), "face named");
    Ok(new)
}

/// Distinct source photos containing `name`, sorted.
pub async fn photos_for(faces: &dyn BlobStore, name: &str) -> Result<Vec<String>> {
    let label = Label::named(name)?;
    let photos: BTreeSet<String> = list_label(faces, &label)
        .await?
        .into_iter()
        .map(|key| key.photo_id().to_string())
        .collect();
    Ok(photos.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBlobStore;
    use bytes::Bytes;

    const U1: &str = "11111111111111111111111111111111";
    const U2: &str = "22222222222222222222222222222222";

    async fn seeded(keys: &[String]) -> MemoryBlobStore {
        let store = MemoryBlobStore::new();
        for key in keys {
            store.put(key, Bytes::from_static(b"jpeg")).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn next_unlabeled_is_deterministic() {
        let store = seeded(&[
            format!("unlabeled-{U2}___P1"),
            format!("unlabeled-{U1}___P2"),
            format!("alice-{U1}___P0"),
        ])
        .await;
        let next = next_unlabeled(&store).await.unwrap().unwrap();
        assert_eq!(next.face_uuid(), U1);
        assert_eq!(next.photo_id(), "P2");
        assert_eq!(pending_count(&store).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn next_unlabeled_on_empty_bucket_is_none() {
        let store = MemoryBlobStore::new();
        assert!(next_unlabeled(&store).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn next_unlabeled_skips_foreign_keys() {
        let store = seeded(&["unlabeled-garbage".to_string(), format!("unlabeled-{U2}___P1")]).await;
        assert_eq!(next_unlabeled(&store).await.unwrap().unwrap().face_uuid(), U2);
    }

    #[tokio::test]
    async fn rename_moves_crop_and_lowercases() {
        let store = seeded(&[format!("unlabeled-{U1}___P1")]).await;
        let key = rename(&store, U1, "Alice").await.unwrap();
        assert_eq!(key.to_string(), format!("alice-{U1}___P1"));
        assert_eq!(store.keys(), vec![format!("alice-{U1}___P1")]);
        assert!(next_unlabeled(&store).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rename_unknown_or_already_named_face_is_not_found() {
        let store = seeded(&[format!("alice-{U1}___P1")]).await;
        assert!(rename(&store, U1, "bob").await.unwrap_err().is_not_found());
        assert!(rename(&store, U2, "bob").await.unwrap_err().is_not_found());
        assert!(rename(&store, "not-a-uuid", "bob").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn rename_rejects_bad_names_without_touching_store() {
        let store = seeded(&[format!("unlabeled-{U1}___P1")]).await;
        let err = rename(&store, U1, "mary-jane").await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidName(_)));
        assert_eq!(store.keys(), vec![format!("unlabeled-{U1}___P1")]);
    }

    #[tokio::test]
    async fn photos_for_dedups_and_isolates_names() {
        let store = seeded(&[
            format!("alice-{U1}___P1"),
            format!("alice-{U2}___P1"),
            format!("alice-33333333333333333333333333333333___P0"),
            format!("alicia-44444444444444444444444444444444___P9"),
            format!("unlabeled-55555555555555555555555555555555___P7"),
        ])
        .await;
        assert_eq!(photos_for(&store, "ALICE").await.unwrap(), vec!["P0", "P1"]);
        assert!(photos_for(&store, "bob").await.unwrap().is_empty());
    }
}
