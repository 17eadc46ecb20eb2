//! Marker Pipeline: a group's map icon.
//!
//! A marker upload is decoded, rendered to a fixed square by the configured
//! [`MarkerRenderer`], and handed to the [`Synchronizer`] which stores it and
//! rebuilds the city's spritesheet. A marker that cannot be placed in the
//! sheet is useless, so synchroniser errors fail the call. The catalog
//! write-back and the staging delete that follow are best-effort.

use crate::catalog::GroupCatalog;
use crate::imaging::{CodecError, MarkerRenderer, decode};
use crate::layout::{MARKER_EXTENSIONS, public_url, spritesheet_png_path};
use crate::slug::slugify;
use crate::sprites::{SheetReport, SyncError, Synchronizer};
use crate::staging::{self, StagingError};
use crate::storage::BlobStore;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarkerError {
    #[error("group code {0:?} does not produce a marker key")]
    InvalidKey(String),
    #[error(transparent)]
    Staging(#[from] StagingError),
    #[error("failed to decode marker {object}: {source}")]
    Decode {
        object: String,
        #[source]
        source: CodecError,
    },
    #[error("failed to regenerate spritesheet: {0}")]
    Sync(#[from] SyncError),
    #[error("render task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result of processing one marker upload.
#[derive(Debug, Clone)]
pub struct ProcessedMarker {
    /// Public URL of the city's spritesheet PNG.
    pub url: String,
    pub marker_key: String,
    /// Written back to the group, when the write-back succeeded.
    pub public_id: Option<String>,
    pub sheet: SheetReport,
}

pub struct MarkerPipeline {
    blobs: Arc<dyn BlobStore>,
    catalog: Arc<dyn GroupCatalog>,
    sprites: Arc<Synchronizer>,
    renderer: Arc<dyn MarkerRenderer>,
    staging_bucket: String,
    optimized_bucket: String,
    public_base_url: String,
}

impl MarkerPipeline {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        catalog: Arc<dyn GroupCatalog>,
        sprites: Arc<Synchronizer>,
        renderer: Arc<dyn MarkerRenderer>,
        staging_bucket: impl Into<String>,
        optimized_bucket: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            blobs,
            catalog,
            sprites,
            renderer,
            staging_bucket: staging_bucket.into(),
            optimized_bucket: optimized_bucket.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub async fn process_marker(
        &self,
        image_uuid: &str,
        city: &str,
        group_code: &str,
    ) -> Result<ProcessedMarker, MarkerError> {
        let marker_key = slugify(group_code);
        if marker_key.is_empty() {
            return Err(MarkerError::InvalidKey(group_code.to_string()));
        }
        tracing::info!(image_uuid, city, group_code, marker_key, "processing marker");

        let staged = staging::locate(
            self.blobs.as_ref(),
            &self.staging_bucket,
            image_uuid,
            MARKER_EXTENSIONS,
        )
        .await?;

        let object = staged.object.clone();
        let renderer = Arc::clone(&self.renderer);
        let size = self.sprites.marker_size();
        let rendered = tokio::task::spawn_blocking(move || {
            decode(&staged.bytes)
                .map(|img| renderer.render(&img, size))
                .map_err(|source| MarkerError::Decode {
                    object: staged.object,
                    source,
                })
        })
        .await??;

        let sheet = self.sprites.regenerate(city, &marker_key, rendered).await?;

        let public_id = self.write_back(group_code, &marker_key).await;

        staging::discard(self.blobs.as_ref(), &self.staging_bucket, &object).await;

        let url = public_url(
            &self.public_base_url,
            &self.optimized_bucket,
            &spritesheet_png_path(city),
        );
        tracing::info!(city, marker_key, url, "marker processing complete");
        Ok(ProcessedMarker {
            url,
            marker_key,
            public_id,
            sheet,
        })
    }

    /// Record the marker key and a public id on the group row. Never fails
    /// the pipeline: the sheet is already correct without it.
    async fn write_back(&self, group_code: &str, marker_key: &str) -> Option<String> {
        let group = match self.catalog.group_by_code(group_code).await {
            Ok(Some(group)) => group,
            Ok(None) => {
                tracing::warn!(group_code, "group not found, marker not recorded in catalog");
                return None;
            }
            Err(err) => {
                tracing::warn!(group_code, %err, "group lookup failed, marker not recorded in catalog");
                return None;
            }
        };

        let public_id = slugify(&group.name);
        match self
            .catalog
            .set_marker_and_public_id(group_code, &public_id, marker_key)
            .await
        {
            Ok(()) => {
                tracing::info!(group_code, public_id, marker_key, "recorded marker on group");
                Some(public_id)
            }
            Err(err) => {
                tracing::warn!(group_code, %err, "failed to record marker on group");
                None
            }
        }
    }
}
