//! Blob Store Adapter.
//!
//! The pipeline only ever needs four operations against a bucket + path
//! addressed object store: existence check, download, upload with a content
//! type, and delete. [`BlobStore`] is that seam; [`ObjectStoreBlobs`] is the
//! production implementation on top of the `object_store` crate, with one
//! backing store per bucket name:
//!
//! | Backend | `object_store` type | Attributes |
//! |---|---|---|
//! | `local` | `LocalFileSystem` rooted at `{root}/{bucket}` | not stored |
//! | `memory` | `InMemory` | stored |
//! | `gcs` | `GoogleCloudStorage` (credentials from the environment) | stored |
//!
//! Uploads carry `Content-Type` and a short `Cache-Control` so a rebuilt
//! spritesheet propagates to clients within minutes.

use crate::config::{StorageBackend, StorageConfig};
use async_trait::async_trait;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Cache policy applied to every upload.
pub const CACHE_CONTROL: &str = "public, max-age=300";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unknown bucket: {0}")]
    UnknownBucket(String),
    #[error("Invalid object path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("Object not found: {bucket}/{path}")]
    NotFound { bucket: String, path: String },
    #[error("{op} {bucket}/{path} failed: {source}")]
    Backend {
        op: &'static str,
        bucket: String,
        path: String,
        #[source]
        source: object_store::Error,
    },
}

/// Minimal object-store contract used by the pipeline.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// `Ok(false)` only for a definite "not found"; other failures are errors.
    async fn exists(&self, bucket: &str, path: &str) -> Result<bool, StorageError>;

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Create or overwrite the object.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    async fn delete(&self, bucket: &str, path: &str) -> Result<(), StorageError>;
}

struct BucketHandle {
    store: Arc<dyn ObjectStore>,
    attributes: bool,
}

/// [`BlobStore`] backed by one `object_store` instance per bucket.
#[derive(Default)]
pub struct ObjectStoreBlobs {
    buckets: HashMap<String, BucketHandle>,
}

impl std::fmt::Debug for ObjectStoreBlobs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.buckets.keys().collect();
        names.sort();
        f.debug_struct("ObjectStoreBlobs")
            .field("buckets", &names)
            .finish()
    }
}

impl ObjectStoreBlobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bucket. `attributes` says whether the backend can persist
    /// content-type / cache-control metadata.
    pub fn with_bucket(
        mut self,
        name: impl Into<String>,
        store: Arc<dyn ObjectStore>,
        attributes: bool,
    ) -> Self {
        self.buckets
            .insert(name.into(), BucketHandle { store, attributes });
        self
    }

    /// Every bucket is an independent in-memory store.
    pub fn in_memory(buckets: &[&str]) -> Self {
        buckets.iter().fold(Self::new(), |blobs, name| {
            blobs.with_bucket(*name, Arc::new(InMemory::new()), true)
        })
    }

    /// Every bucket is a directory under `root`, created if missing.
    pub fn local(root: &Path, buckets: &[&str]) -> Result<Self, StorageError> {
        let mut blobs = Self::new();
        for name in buckets {
            let dir = root.join(name);
            std::fs::create_dir_all(&dir)?;
            let store = LocalFileSystem::new_with_prefix(&dir).map_err(|source| {
                StorageError::Backend {
                    op: "open",
                    bucket: name.to_string(),
                    path: dir.display().to_string(),
                    source,
                }
            })?;
            blobs = blobs.with_bucket(*name, Arc::new(store), false);
        }
        Ok(blobs)
    }

    /// Google Cloud Storage buckets; credentials come from the environment.
    pub fn gcs(buckets: &[&str]) -> Result<Self, StorageError> {
        let mut blobs = Self::new();
        for name in buckets {
            let store = GoogleCloudStorageBuilder::from_env()
                .with_bucket_name(*name)
                .build()
                .map_err(|source| StorageError::Backend {
                    op: "open",
                    bucket: name.to_string(),
                    path: String::new(),
                    source,
                })?;
            blobs = blobs.with_bucket(*name, Arc::new(store), true);
        }
        Ok(blobs)
    }

    /// Build the staging and optimized buckets described by `config`.
    pub fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let buckets = [
            config.staging_bucket.as_str(),
            config.optimized_bucket.as_str(),
        ];
        match config.backend {
            StorageBackend::Local => Self::local(Path::new(&config.root), &buckets),
            StorageBackend::Memory => Ok(Self::in_memory(&buckets)),
            StorageBackend::Gcs => Self::gcs(&buckets),
        }
    }

    /// Stored `Content-Type` of an object, if the backend keeps attributes.
    pub async fn content_type(
        &self,
        bucket: &str,
        path: &str,
    ) -> Result<Option<String>, StorageError> {
        let (handle, location) = self.resolve(bucket, path)?;
        let result = handle
            .store
            .get(&location)
            .await
            .map_err(|e| map_backend("get", bucket, path, e))?;
        Ok(result
            .attributes
            .get(&Attribute::ContentType)
            .map(|v| AsRef::<str>::as_ref(v).to_string()))
    }

    fn resolve(&self, bucket: &str, path: &str) -> Result<(&BucketHandle, ObjectPath), StorageError> {
        let handle = self
            .buckets
            .get(bucket)
            .ok_or_else(|| StorageError::UnknownBucket(bucket.to_string()))?;
        let location = ObjectPath::parse(path).map_err(|e| StorageError::InvalidPath {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Ok((handle, location))
    }
}

fn map_backend(op: &'static str, bucket: &str, path: &str, source: object_store::Error) -> StorageError {
    match source {
        object_store::Error::NotFound { .. } => StorageError::NotFound {
            bucket: bucket.to_string(),
            path: path.to_string(),
        },
        source => StorageError::Backend {
            op,
            bucket: bucket.to_string(),
            path: path.to_string(),
            source,
        },
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBlobs {
    async fn exists(&self, bucket: &str, path: &str) -> Result<bool, StorageError> {
        let (handle, location) = self.resolve(bucket, path)?;
        match handle.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(map_backend("head", bucket, path, e)),
        }
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, StorageError> {
        let (handle, location) = self.resolve(bucket, path)?;
        let result = handle
            .store
            .get(&location)
            .await
            .map_err(|e| map_backend("get", bucket, path, e))?;
        let bytes = result
            .bytes()
            .await
            .map_err(|e| map_backend("read", bucket, path, e))?;
        Ok(bytes.to_vec())
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let (handle, location) = self.resolve(bucket, path)?;
        let size = data.len();
        let payload = PutPayload::from(data);

        let put = if handle.attributes {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            attributes.insert(Attribute::CacheControl, CACHE_CONTROL.into());
            let opts = PutOptions {
                attributes,
                ..Default::default()
            };
            handle.store.put_opts(&location, payload, opts).await
        } else {
            handle.store.put(&location, payload).await
        };
        put.map_err(|e| map_backend("put", bucket, path, e))?;

        tracing::debug!(bucket, path, size, content_type, "uploaded object");
        Ok(())
    }

    async fn delete(&self, bucket: &str, path: &str) -> Result<(), StorageError> {
        let (handle, location) = self.resolve(bucket, path)?;
        handle
            .store
            .delete(&location)
            .await
            .map_err(|e| map_backend("delete", bucket, path, e))
    }
}
