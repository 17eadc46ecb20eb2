//! Staging bucket lookup.
//!
//! Uploads arrive as `{uuid}.{ext}` with the extension unknown to the
//! pipeline, so both pipelines probe a fixed, ordered list of extensions and
//! take the first object that exists.

use crate::imaging::codec::sniff_format;
use crate::layout::staging_object;
use crate::storage::{BlobStore, StorageError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("image not found with known extension: {image_uuid} (tried {tried})")]
    NotFound { image_uuid: String, tried: String },
    #[error("staging lookup for {object} failed: {source}")]
    Storage {
        object: String,
        #[source]
        source: StorageError,
    },
}

/// A raw upload located in the staging bucket.
#[derive(Debug, Clone)]
pub struct StagedImage {
    /// Object name inside the staging bucket, e.g. `abc.png`.
    pub object: String,
    pub bytes: Vec<u8>,
}

/// Probe `bucket` for `{image_uuid}.{ext}` over `extensions` in order and
/// download the first hit.
///
/// A failed existence check is logged and the probe moves on to the next
/// extension. The last such failure is returned only when no extension
/// resolves, so a transient error is not reported as "not there".
pub async fn locate(
    blobs: &dyn BlobStore,
    bucket: &str,
    image_uuid: &str,
    extensions: &[&str],
) -> Result<StagedImage, StagingError> {
    let mut last_error = None;
    for ext in extensions {
        let object = staging_object(image_uuid, ext);
        match blobs.exists(bucket, &object).await {
            Ok(true) => {}
            Ok(false) => continue,
            Err(err) => {
                tracing::warn!(bucket, object, %err, "staging probe failed, trying next extension");
                last_error = Some(StagingError::Storage {
                    object,
                    source: err,
                });
                continue;
            }
        }

        let bytes = blobs
            .download(bucket, &object)
            .await
            .map_err(|source| StagingError::Storage {
                object: object.clone(),
                source,
            })?;

        tracing::info!(bucket, object, size = bytes.len(), "found staged upload");
        tracing::debug!(
            object,
            format = ?sniff_format(&bytes),
            head = %hex_prefix(&bytes, 16),
            "staged upload leading bytes"
        );
        return Ok(StagedImage { object, bytes });
    }

    Err(last_error.unwrap_or_else(|| StagingError::NotFound {
        image_uuid: image_uuid.to_string(),
        tried: extensions.join(", "),
    }))
}

/// Remove a processed upload. Failures are logged, never returned.
pub async fn discard(blobs: &dyn BlobStore, bucket: &str, object: &str) {
    match blobs.delete(bucket, object).await {
        Ok(()) => tracing::info!(bucket, object, "deleted staged upload"),
        Err(err) => tracing::warn!(bucket, object, %err, "failed to delete staged upload, continuing"),
    }
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes
        .iter()
        .take(n)
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{MARKER_EXTENSIONS, PHOTO_EXTENSIONS};
    use crate::test_helpers::{MockBlobStore, RecordedOp};

    #[tokio::test]
    async fn finds_png_after_probing_jpg_and_jpeg() {
        let blobs = MockBlobStore::new();
        blobs.put("staging", "u1.png", vec![1, 2, 3]);

        let staged = locate(&blobs, "staging", "u1", PHOTO_EXTENSIONS).await.unwrap();
        assert_eq!(staged.object, "u1.png");
        assert_eq!(staged.bytes, vec![1, 2, 3]);

        let probes: Vec<String> = blobs
            .get_operations()
            .into_iter()
            .filter_map(|op| match op {
                RecordedOp::Exists { path, .. } => Some(path),
                _ => None,
            })
            .collect();
        assert_eq!(probes, vec!["u1.jpg", "u1.jpeg", "u1.png"]);
    }

    #[tokio::test]
    async fn first_hit_wins() {
        let blobs = MockBlobStore::new();
        blobs.put("staging", "u1.gif", vec![9]);
        blobs.put("staging", "u1.png", vec![1]);

        let staged = locate(&blobs, "staging", "u1", MARKER_EXTENSIONS).await.unwrap();
        assert_eq!(staged.object, "u1.png");
    }

    #[tokio::test]
    async fn nothing_found_is_not_found() {
        let blobs = MockBlobStore::new();
        let err = locate(&blobs, "staging", "ghost", PHOTO_EXTENSIONS)
            .await
            .unwrap_err();
        assert!(matches!(err, StagingError::NotFound { .. }));
        assert!(err.to_string().starts_with("image not found with known extension"));
        assert_eq!(blobs.get_operations().len(), PHOTO_EXTENSIONS.len());
    }

    #[tokio::test]
    async fn failed_exists_check_moves_to_next_extension() {
        let blobs = MockBlobStore::new();
        blobs.put("staging", "u1.jpeg", vec![1]);
        blobs.fail_exists("staging", "u1.jpg");

        let staged = locate(&blobs, "staging", "u1", PHOTO_EXTENSIONS).await.unwrap();
        assert_eq!(staged.object, "u1.jpeg");
    }

    #[tokio::test]
    async fn failed_exists_check_without_hit_is_error() {
        let blobs = MockBlobStore::new();
        blobs.fail_exists("staging", "u1.jpg");

        let err = locate(&blobs, "staging", "u1", PHOTO_EXTENSIONS)
            .await
            .unwrap_err();
        assert!(matches!(err, StagingError::Storage { ref object, .. } if object == "u1.jpg"));
        assert_eq!(blobs.get_operations().len(), PHOTO_EXTENSIONS.len());
    }

    #[tokio::test]
    async fn discard_swallows_failure() {
        let blobs = MockBlobStore::new();
        blobs.put("staging", "u1.png", vec![1]);
        blobs.fail_delete("staging", "u1.png");

        discard(&blobs, "staging", "u1.png").await;
        assert!(blobs.contains("staging", "u1.png"));
    }

    #[test]
    fn hex_prefix_truncates() {
        assert_eq!(hex_prefix(&[0x89, 0x50, 0x4e, 0x47], 2), "89 50");
        assert_eq!(hex_prefix(&[], 4), "");
    }
}
