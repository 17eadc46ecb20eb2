//! Spritesheet Synchronizer.
//!
//! Every city has one packed PNG atlas of its group markers plus a JSON file
//! of positions. Both are rebuilt in full whenever a marker changes:
//!
//! ```text
//! 1. Load      markers.json        (missing/corrupt → empty)
//! 2. Query     active catalog keys (failure → metadata only)
//! 3. Probe     catalog keys not covered by metadata
//! 4. Reconcile → ValidMarkerSet    (pure, see reconcile)
//! 5. Download  each valid marker   (failure → omitted)
//! 6. Save      new marker + verify (failure → error)
//! 7. Pack      sorted keys → grid  (see atlas)
//! 8. Upload    markers.png, markers.json
//! ```
//!
//! Rebuilds of one city are serialised by [`CityLocks`] for the whole
//! read-modify-write; different cities proceed in parallel. The lock is
//! in-process only.

pub mod atlas;
pub mod metadata;
pub mod reconcile;

use crate::catalog::GroupCatalog;
use crate::config::MarkersConfig;
use crate::imaging::{CodecError, decode, encode_png};
use crate::layout::{marker_path, normalize_marker_path, spritesheet_json_path, spritesheet_png_path};
use crate::storage::{BlobStore, StorageError};
use atlas::{PackedSheet, SheetEntry};
use image::{DynamicImage, RgbaImage};
use reconcile::{Provenance, StorageProbe, keys_to_probe, reconcile};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub use metadata::{MarkerInfo, SpritesheetMetadata};
pub use reconcile::ValidMarkerSet;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("failed to upload {path}: {source}")]
    Upload {
        path: String,
        #[source]
        source: StorageError,
    },
    #[error("failed to verify marker image was saved: {path} ({reason})")]
    MarkerNotSaved { path: String, reason: String },
    #[error("no markers to pack for city {city}")]
    NoMarkers { city: String },
    #[error("encode failed: {0}")]
    Encode(#[from] CodecError),
    #[error("metadata serialization failed: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("rebuild task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Per-city rebuild exclusion.
///
/// Entries are never evicted; the map holds one mutex per city seen.
#[derive(Debug, Default)]
pub struct CityLocks {
    cities: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `city`. Released when the guard drops.
    pub async fn acquire(&self, city: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut cities = self.cities.lock().unwrap_or_else(|e| e.into_inner());
            cities.entry(city.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Outcome of a rebuild, for logging and CLI output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetReport {
    pub city: String,
    /// Marker keys in atlas order.
    pub markers: Vec<String>,
    pub cols: u32,
    pub rows: u32,
    pub width: u32,
    pub height: u32,
    pub png_path: String,
    pub json_path: String,
    /// Candidates that were dropped because they could not be loaded.
    pub omitted: Vec<String>,
}

/// Rebuilds city spritesheets in the optimized bucket.
pub struct Synchronizer {
    blobs: Arc<dyn BlobStore>,
    catalog: Arc<dyn GroupCatalog>,
    bucket: String,
    marker_size: u32,
    padding: u32,
    locks: CityLocks,
}

impl Synchronizer {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        catalog: Arc<dyn GroupCatalog>,
        bucket: impl Into<String>,
        markers: &MarkersConfig,
    ) -> Self {
        Self {
            blobs,
            catalog,
            bucket: bucket.into(),
            marker_size: markers.size,
            padding: markers.padding,
            locks: CityLocks::new(),
        }
    }

    pub fn marker_size(&self) -> u32 {
        self.marker_size
    }

    /// Store `image` as the marker for `marker_key` and rebuild the city's
    /// sheet around it.
    pub async fn regenerate(
        &self,
        city: &str,
        marker_key: &str,
        image: RgbaImage,
    ) -> Result<SheetReport, SyncError> {
        tracing::info!(city, marker_key, "regenerating spritesheet");
        self.sync(city, Some((marker_key, image))).await
    }

    /// Rebuild the city's sheet from what is already stored.
    pub async fn rebuild(&self, city: &str) -> Result<SheetReport, SyncError> {
        tracing::info!(city, "rebuilding spritesheet");
        self.sync(city, None).await
    }

    async fn sync(
        &self,
        city: &str,
        new_marker: Option<(&str, RgbaImage)>,
    ) -> Result<SheetReport, SyncError> {
        let _guard = self.locks.acquire(city).await;

        let existing = SpritesheetMetadata::load(self.blobs.as_ref(), &self.bucket, city).await;
        let valid = self.valid_markers(city, &existing).await;
        tracing::info!(
            city,
            total = valid.len(),
            from_metadata = valid.count(Provenance::Metadata),
            from_catalog = valid.count(Provenance::Catalog),
            "reconciled marker set"
        );

        let skip = new_marker.as_ref().map(|(key, _)| *key);
        let downloaded = self.download_markers(city, &valid, skip).await;

        let mut fresh = None;
        if let Some((key, image)) = new_marker {
            let path = self.save_marker(city, key, &image).await?;
            fresh = Some((key.to_string(), SheetEntry { image, path }));
        }

        let size = self.marker_size;
        let padding = self.padding;
        let city_owned = city.to_string();
        let (sheet, omitted) = tokio::task::spawn_blocking(move || {
            let (mut entries, omitted) = decode_markers(&city_owned, downloaded);
            if let Some((key, entry)) = fresh {
                entries.insert(key, entry);
            }
            (atlas::pack(&entries, size, padding), omitted)
        })
        .await?;

        let sheet = sheet.ok_or_else(|| SyncError::NoMarkers {
            city: city.to_string(),
        })?;
        self.upload_sheet(city, sheet, omitted).await
    }

    async fn valid_markers(&self, city: &str, existing: &SpritesheetMetadata) -> ValidMarkerSet {
        let catalog_keys = match self.catalog.active_marker_keys(city).await {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!(city, %err, "catalog query failed, using metadata only");
                Vec::new()
            }
        };

        let mut probes = Vec::new();
        for key in keys_to_probe(existing, &catalog_keys) {
            let path = marker_path(city, key);
            let probe = match self.blobs.exists(&self.bucket, &path).await {
                Ok(true) => StorageProbe::Present,
                Ok(false) => {
                    tracing::warn!(city, marker_key = key, path, "marker in catalog but not in storage");
                    StorageProbe::Missing
                }
                Err(err) => {
                    tracing::warn!(city, marker_key = key, path, %err, "marker probe failed");
                    StorageProbe::Failed
                }
            };
            probes.push((key.to_string(), probe));
        }

        reconcile(city, existing, &probes)
    }

    /// Raw bytes of every valid marker except `skip`, with the path to record.
    async fn download_markers(
        &self,
        city: &str,
        valid: &ValidMarkerSet,
        skip: Option<&str>,
    ) -> Vec<Downloaded> {
        let mut out = Vec::with_capacity(valid.len());
        for (key, marker) in valid.iter() {
            if Some(key) == skip {
                tracing::debug!(city, marker_key = key, "replacing stored marker");
                continue;
            }
            match self.blobs.download(&self.bucket, &marker.path).await {
                Ok(bytes) => {
                    let path = self.migrate_legacy(city, key, &marker.path, &bytes).await;
                    out.push(Downloaded {
                        key: key.to_string(),
                        path,
                        bytes: Some(bytes),
                    });
                }
                Err(err) => {
                    tracing::warn!(city, marker_key = key, path = marker.path, %err, "failed to download marker, omitting");
                    out.push(Downloaded {
                        key: key.to_string(),
                        path: marker.path.clone(),
                        bytes: None,
                    });
                }
            }
        }
        out
    }

    /// Path to record for a marker read from `recorded`.
    ///
    /// A legacy `{city}/{key}/marker.png` is copied to the current layout
    /// first; the recorded path only moves once that copy exists.
    async fn migrate_legacy(&self, city: &str, key: &str, recorded: &str, bytes: &[u8]) -> String {
        let normalized = normalize_marker_path(city, key, recorded);
        if normalized == recorded {
            return normalized;
        }
        match self
            .blobs
            .upload(&self.bucket, &normalized, bytes.to_vec(), "image/png")
            .await
        {
            Ok(()) => {
                tracing::info!(city, marker_key = key, from = recorded, to = %normalized, "migrated legacy marker");
                normalized
            }
            Err(err) => {
                tracing::warn!(city, marker_key = key, path = recorded, %err, "legacy marker copy failed, keeping old path");
                recorded.to_string()
            }
        }
    }

    async fn save_marker(&self, city: &str, key: &str, image: &RgbaImage) -> Result<String, SyncError> {
        let path = marker_path(city, key);
        let png = encode_png(&DynamicImage::ImageRgba8(image.clone()))?;

        self.blobs
            .upload(&self.bucket, &path, png, "image/png")
            .await
            .map_err(|source| SyncError::Upload {
                path: path.clone(),
                source,
            })?;

        match self.blobs.exists(&self.bucket, &path).await {
            Ok(true) => {
                tracing::info!(city, marker_key = key, path, "saved marker image");
                Ok(path)
            }
            Ok(false) => Err(SyncError::MarkerNotSaved {
                path,
                reason: "object missing after upload".to_string(),
            }),
            Err(err) => Err(SyncError::MarkerNotSaved {
                path,
                reason: err.to_string(),
            }),
        }
    }

    async fn upload_sheet(
        &self,
        city: &str,
        sheet: PackedSheet,
        omitted: Vec<String>,
    ) -> Result<SheetReport, SyncError> {
        let PackedSheet {
            canvas,
            metadata,
            layout,
        } = sheet;
        let (width, height) = canvas.dimensions();
        let png = tokio::task::spawn_blocking(move || encode_png(&DynamicImage::ImageRgba8(canvas)))
            .await??;
        let json = metadata.to_json()?;

        let png_path = spritesheet_png_path(city);
        let json_path = spritesheet_json_path(city);

        tracing::info!(city, path = png_path, size = png.len(), "uploading spritesheet");
        self.blobs
            .upload(&self.bucket, &png_path, png, "image/png")
            .await
            .map_err(|source| SyncError::Upload {
                path: png_path.clone(),
                source,
            })?;

        tracing::info!(city, path = json_path, markers = metadata.markers.len(), "uploading spritesheet metadata");
        self.blobs
            .upload(&self.bucket, &json_path, json, "application/json")
            .await
            .map_err(|source| SyncError::Upload {
                path: json_path.clone(),
                source,
            })?;

        Ok(SheetReport {
            city: city.to_string(),
            markers: metadata.markers.keys().cloned().collect(),
            cols: layout.cols,
            rows: layout.rows,
            width,
            height,
            png_path,
            json_path,
            omitted,
        })
    }
}

struct Downloaded {
    key: String,
    path: String,
    bytes: Option<Vec<u8>>,
}

/// Decode downloaded markers; undecodable or missing ones are returned by key.
fn decode_markers(city: &str, downloaded: Vec<Downloaded>) -> (BTreeMap<String, SheetEntry>, Vec<String>) {
    let mut entries = BTreeMap::new();
    let mut omitted = Vec::new();
    for Downloaded { key, path, bytes } in downloaded {
        let Some(bytes) = bytes else {
            omitted.push(key);
            continue;
        };
        match decode(&bytes) {
            Ok(img) => {
                entries.insert(
                    key,
                    SheetEntry {
                        image: img.to_rgba8(),
                        path,
                    },
                );
            }
            Err(err) => {
                tracing::warn!(city, marker_key = key, path, %err, "failed to decode marker, omitting");
                omitted.push(key);
            }
        }
    }
    (entries, omitted)
}
