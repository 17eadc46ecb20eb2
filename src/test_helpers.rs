//! Shared test utilities for the ride-assets test suite.
//!
//! Provides recording mocks for the two I/O seams ([`BlobStore`] and
//! [`GroupCatalog`]) plus synthetic image fixtures.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let blobs = MockBlobStore::new();
//! blobs.put("staging", "u1.png", png_bytes(32, 32, [255, 0, 0, 255]));
//! blobs.fail_delete("staging", "u1.png");
//!
//! // ... run a pipeline ...
//!
//! assert!(blobs.uploads().iter().all(|(bucket, _)| bucket == "optimized"));
//! ```

use crate::catalog::{CatalogError, Group, GroupCatalog};
use crate::layout::EntityKind;
use crate::storage::{BlobStore, StorageError};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use std::sync::Mutex;

// =========================================================================
// Blob store mock
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedOp {
    Exists { bucket: String, path: String },
    Download { bucket: String, path: String },
    Upload {
        bucket: String,
        path: String,
        content_type: String,
        size: usize,
    },
    Delete { bucket: String, path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Fault {
    Exists,
    Download,
    Upload,
    Delete,
    /// Upload reports success but stores nothing.
    DropUpload,
}

/// In-memory [`BlobStore`] that records every call and fails on demand.
#[derive(Default)]
pub struct MockBlobStore {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    operations: Mutex<Vec<RecordedOp>>,
    faults: Mutex<HashSet<(Fault, String, String)>>,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without recording an operation.
    pub fn put(&self, bucket: &str, path: &str, bytes: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), path.to_string()), bytes);
    }

    pub fn get(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    pub fn contains(&self, bucket: &str, path: &str) -> bool {
        self.get(bucket, path).is_some()
    }

    /// Remove an object without recording an operation.
    pub fn remove(&self, bucket: &str, path: &str) {
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), path.to_string()));
    }

    /// Every stored path in `bucket`, sorted.
    pub fn paths(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn get_operations(&self) -> Vec<RecordedOp> {
        self.operations.lock().unwrap().clone()
    }

    /// `(bucket, path)` of every upload, in call order.
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.get_operations()
            .into_iter()
            .filter_map(|op| match op {
                RecordedOp::Upload { bucket, path, .. } => Some((bucket, path)),
                _ => None,
            })
            .collect()
    }

    /// `(bucket, path)` of every download, in call order.
    pub fn downloads(&self) -> Vec<(String, String)> {
        self.get_operations()
            .into_iter()
            .filter_map(|op| match op {
                RecordedOp::Download { bucket, path } => Some((bucket, path)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_operations(&self) {
        self.operations.lock().unwrap().clear();
    }

    pub fn fail_exists(&self, bucket: &str, path: &str) {
        self.inject(Fault::Exists, bucket, path);
    }

    pub fn fail_download(&self, bucket: &str, path: &str) {
        self.inject(Fault::Download, bucket, path);
    }

    pub fn fail_upload(&self, bucket: &str, path: &str) {
        self.inject(Fault::Upload, bucket, path);
    }

    pub fn fail_delete(&self, bucket: &str, path: &str) {
        self.inject(Fault::Delete, bucket, path);
    }

    pub fn drop_upload(&self, bucket: &str, path: &str) {
        self.inject(Fault::DropUpload, bucket, path);
    }

    fn inject(&self, fault: Fault, bucket: &str, path: &str) {
        self.faults
            .lock()
            .unwrap()
            .insert((fault, bucket.to_string(), path.to_string()));
    }

    fn faulted(&self, fault: Fault, bucket: &str, path: &str) -> bool {
        self.faults
            .lock()
            .unwrap()
            .contains(&(fault, bucket.to_string(), path.to_string()))
    }

    fn record(&self, op: RecordedOp) {
        self.operations.lock().unwrap().push(op);
    }
}

fn injected(op: &'static str, bucket: &str, path: &str) -> StorageError {
    StorageError::Backend {
        op,
        bucket: bucket.to_string(),
        path: path.to_string(),
        source: object_store::Error::Generic {
            store: "mock",
            source: "injected failure".into(),
        },
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn exists(&self, bucket: &str, path: &str) -> Result<bool, StorageError> {
        self.record(RecordedOp::Exists {
            bucket: bucket.to_string(),
            path: path.to_string(),
        });
        if self.faulted(Fault::Exists, bucket, path) {
            return Err(injected("head", bucket, path));
        }
        Ok(self.contains(bucket, path))
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, StorageError> {
        self.record(RecordedOp::Download {
            bucket: bucket.to_string(),
            path: path.to_string(),
        });
        if self.faulted(Fault::Download, bucket, path) {
            return Err(injected("get", bucket, path));
        }
        self.get(bucket, path).ok_or_else(|| StorageError::NotFound {
            bucket: bucket.to_string(),
            path: path.to_string(),
        })
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.record(RecordedOp::Upload {
            bucket: bucket.to_string(),
            path: path.to_string(),
            content_type: content_type.to_string(),
            size: data.len(),
        });
        if self.faulted(Fault::Upload, bucket, path) {
            return Err(injected("put", bucket, path));
        }
        if !self.faulted(Fault::DropUpload, bucket, path) {
            self.put(bucket, path, data);
        }
        Ok(())
    }

    async fn delete(&self, bucket: &str, path: &str) -> Result<(), StorageError> {
        self.record(RecordedOp::Delete {
            bucket: bucket.to_string(),
            path: path.to_string(),
        });
        if self.faulted(Fault::Delete, bucket, path) {
            return Err(injected("delete", bucket, path));
        }
        self.remove(bucket, path);
        Ok(())
    }
}

// =========================================================================
// Catalog mock
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogOp {
    ActiveMarkerKeys(String),
    GroupByCode(String),
    SetMarker {
        code: String,
        public_id: String,
        marker: String,
    },
    UpdateImageUrl {
        kind: EntityKind,
        entity_id: String,
        url: String,
    },
}

/// In-memory [`GroupCatalog`] over a list of groups.
#[derive(Default)]
pub struct MockCatalog {
    pub groups: Mutex<Vec<Group>>,
    pub image_urls: Mutex<BTreeMap<(EntityKind, String), String>>,
    pub operations: Mutex<Vec<CatalogOp>>,
    pub fail_queries: Mutex<bool>,
    pub fail_writes: Mutex<bool>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an active group in `city` with an optional marker key.
    pub fn with_group(self, code: &str, name: &str, city: &str, marker: Option<&str>) -> Self {
        {
            let mut groups = self.groups.lock().unwrap();
            let id = groups.len() as i64 + 1;
            groups.push(Group {
                id,
                code: code.to_string(),
                name: name.to_string(),
                city: city.to_string(),
                is_active: true,
                marker: marker.map(str::to_string),
                public_id: None,
            });
        }
        self
    }

    /// Register an existing ride so `update_image_url` succeeds for it.
    pub fn with_ride(self, id: &str) -> Self {
        self.image_urls
            .lock()
            .unwrap()
            .insert((EntityKind::Ride, id.to_string()), String::new());
        self
    }

    pub fn failing_queries(self) -> Self {
        *self.fail_queries.lock().unwrap() = true;
        self
    }

    pub fn failing_writes(self) -> Self {
        *self.fail_writes.lock().unwrap() = true;
        self
    }

    pub fn group(&self, code: &str) -> Option<Group> {
        self.groups
            .lock()
            .unwrap()
            .iter()
            .find(|g| g.code == code)
            .cloned()
    }

    pub fn image_url(&self, kind: EntityKind, id: &str) -> Option<String> {
        self.image_urls
            .lock()
            .unwrap()
            .get(&(kind, id.to_string()))
            .filter(|url| !url.is_empty())
            .cloned()
    }

    pub fn get_operations(&self) -> Vec<CatalogOp> {
        self.operations.lock().unwrap().clone()
    }

    /// Operations that would change the database.
    pub fn writes(&self) -> Vec<CatalogOp> {
        self.get_operations()
            .into_iter()
            .filter(|op| matches!(op, CatalogOp::SetMarker { .. } | CatalogOp::UpdateImageUrl { .. }))
            .collect()
    }

    fn record(&self, op: CatalogOp) {
        self.operations.lock().unwrap().push(op);
    }

    fn injected() -> CatalogError {
        CatalogError::Sqlx(sqlx::Error::Protocol("injected failure".into()))
    }
}

#[async_trait]
impl GroupCatalog for MockCatalog {
    async fn active_marker_keys(&self, city: &str) -> Result<Vec<String>, CatalogError> {
        self.record(CatalogOp::ActiveMarkerKeys(city.to_string()));
        if *self.fail_queries.lock().unwrap() {
            return Err(Self::injected());
        }
        let mut keys: Vec<String> = self
            .groups
            .lock()
            .unwrap()
            .iter()
            .filter(|g| g.city == city && g.is_active)
            .filter_map(|g| g.marker.clone())
            .filter(|m| !m.is_empty())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn group_by_code(&self, code: &str) -> Result<Option<Group>, CatalogError> {
        self.record(CatalogOp::GroupByCode(code.to_string()));
        if *self.fail_queries.lock().unwrap() {
            return Err(Self::injected());
        }
        Ok(self.group(code))
    }

    async fn set_marker_and_public_id(
        &self,
        code: &str,
        public_id: &str,
        marker: &str,
    ) -> Result<(), CatalogError> {
        self.record(CatalogOp::SetMarker {
            code: code.to_string(),
            public_id: public_id.to_string(),
            marker: marker.to_string(),
        });
        if *self.fail_writes.lock().unwrap() {
            return Err(Self::injected());
        }
        let mut groups = self.groups.lock().unwrap();
        let group = groups
            .iter_mut()
            .find(|g| g.code == code)
            .ok_or_else(|| CatalogError::NotFound {
                table: "ride_groups",
                id: code.to_string(),
            })?;
        group.public_id = Some(public_id.to_string());
        group.marker = Some(marker.to_string());
        Ok(())
    }

    async fn update_image_url(
        &self,
        kind: EntityKind,
        entity_id: &str,
        url: &str,
    ) -> Result<(), CatalogError> {
        self.record(CatalogOp::UpdateImageUrl {
            kind,
            entity_id: entity_id.to_string(),
            url: url.to_string(),
        });
        if *self.fail_writes.lock().unwrap() {
            return Err(Self::injected());
        }
        let mut urls = self.image_urls.lock().unwrap();
        let key = (kind, entity_id.to_string());
        match urls.get_mut(&key) {
            Some(slot) => {
                *slot = url.to_string();
                Ok(())
            }
            None => Err(CatalogError::NotFound {
                table: match kind {
                    EntityKind::Ride => "rides",
                    EntityKind::Group => "ride_groups",
                },
                id: entity_id.to_string(),
            }),
        }
    }
}

// =========================================================================
// Synthetic images
// =========================================================================

/// A `width`×`height` image with a horizontal gradient over `color`.
pub fn gradient(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
    let img = RgbaImage::from_fn(width, height, |x, _| {
        let shade = ((x * 255) / width.max(1)) as u8;
        Rgba([color[0] ^ shade, color[1], color[2], color[3]])
    });
    DynamicImage::ImageRgba8(img)
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

/// PNG bytes of a [`gradient`].
pub fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    encode(&gradient(width, height, color), ImageFormat::Png)
}

/// JPEG bytes of an opaque [`gradient`].
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let rgb = DynamicImage::ImageRgb8(gradient(width, height, [40, 120, 200, 255]).to_rgb8());
    encode(&rgb, ImageFormat::Jpeg)
}

/// Decode bytes produced by the pipeline.
pub fn decode_bytes(bytes: &[u8]) -> DynamicImage {
    image::load_from_memory(bytes).unwrap()
}
