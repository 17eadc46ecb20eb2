//! Image Optimizer: hero photos for rides and groups.
//!
//! ```text
//! staging/{uuid}.{jpg|jpeg|png|webp|gif}
//!     │  decode once
//!     ├─ resize 400w  → WebP → {city}/{kind}s/{id}/{id}_400w.webp
//!     ├─ resize 800w  → WebP → ..._800w.webp
//!     └─ resize 1200w → WebP → ..._1200w.webp + ..._optimized.webp (returned URL)
//! ```
//!
//! Decoding and encoding run on a blocking thread, with the per-width encodes
//! spread over rayon. Uploads happen afterwards, in ascending width order, so
//! a decode or encode failure writes nothing. The staging object is deleted
//! only after every upload succeeded, and a failed delete is only logged.

use crate::imaging::calculations::{WEBP_MAX_DIMENSION, fits_webp, scaled_height};
use crate::imaging::geometry::resize_to_width;
use crate::imaging::{CodecError, Quality, decode, encode_webp};
use crate::layout::{
    EntityKind, PHOTO_EXTENSIONS, derivative_path, optimized_alias_path, public_url,
};
use crate::staging::{self, StagingError};
use crate::storage::{BlobStore, StorageError};
use rayon::prelude::*;
use std::sync::Arc;
use thiserror::Error;

const WEBP: &str = "image/webp";

#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error(transparent)]
    Staging(#[from] StagingError),
    #[error("failed to decode {object}: {source}")]
    Decode {
        object: String,
        #[source]
        source: CodecError,
    },
    #[error("failed to encode {width}w derivative: {source}")]
    Encode {
        width: u32,
        #[source]
        source: CodecError,
    },
    #[error("failed to upload {path}: {source}")]
    Upload {
        path: String,
        #[source]
        source: StorageError,
    },
    #[error("{object} is {source_width}x{source_height}; its {width}w derivative would be {width}x{height}, over the {max}px limit")]
    TooLarge {
        object: String,
        source_width: u32,
        source_height: u32,
        width: u32,
        height: u32,
        max: u32,
    },
    #[error("no derivative widths configured")]
    NoWidths,
    #[error("encode task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// One uploaded derivative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivative {
    pub width: u32,
    pub height: u32,
    pub path: String,
    pub bytes: usize,
}

/// Result of optimizing one upload.
#[derive(Debug, Clone)]
pub struct OptimizedImage {
    /// Public URL of the `_optimized.webp` alias.
    pub url: String,
    pub alias_path: String,
    /// Ascending by width.
    pub derivatives: Vec<Derivative>,
    /// Staging object the derivatives were made from.
    pub source: String,
}

struct Encoded {
    width: u32,
    height: u32,
    webp: Vec<u8>,
}

pub struct Optimizer {
    blobs: Arc<dyn BlobStore>,
    staging_bucket: String,
    optimized_bucket: String,
    public_base_url: String,
    widths: Vec<u32>,
    quality: Quality,
}

impl Optimizer {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        staging_bucket: impl Into<String>,
        optimized_bucket: impl Into<String>,
        public_base_url: impl Into<String>,
        widths: Vec<u32>,
        quality: Quality,
    ) -> Self {
        Self {
            blobs,
            staging_bucket: staging_bucket.into(),
            optimized_bucket: optimized_bucket.into(),
            public_base_url: public_base_url.into(),
            widths,
            quality,
        }
    }

    /// Turn staged upload `image_uuid` into WebP derivatives for the entity
    /// and return the public URL of the largest one's alias.
    pub async fn process(
        &self,
        image_uuid: &str,
        city: &str,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<OptimizedImage, OptimizeError> {
        if self.widths.is_empty() {
            return Err(OptimizeError::NoWidths);
        }
        tracing::info!(image_uuid, city, %kind, entity_id, "optimizing image");

        let staged = staging::locate(
            self.blobs.as_ref(),
            &self.staging_bucket,
            image_uuid,
            PHOTO_EXTENSIONS,
        )
        .await?;

        let object = staged.object.clone();
        let widths = self.widths.clone();
        let quality = self.quality;
        let encoded = tokio::task::spawn_blocking(move || {
            render_derivatives(&staged.object, &staged.bytes, &widths, quality)
        })
        .await??;

        let mut derivatives = Vec::with_capacity(encoded.len());
        let mut alias_path = String::new();
        let last = encoded.len() - 1;
        for (i, Encoded { width, height, webp }) in encoded.into_iter().enumerate() {
            let path = derivative_path(city, kind, entity_id, width);
            let bytes = webp.len();

            if i == last {
                alias_path = optimized_alias_path(city, kind, entity_id);
                self.upload(&path, webp.clone()).await?;
                self.upload(&alias_path, webp).await?;
            } else {
                self.upload(&path, webp).await?;
            }
            tracing::debug!(city, entity_id, width, height, path, bytes, "uploaded derivative");
            derivatives.push(Derivative {
                width,
                height,
                path,
                bytes,
            });
        }

        staging::discard(self.blobs.as_ref(), &self.staging_bucket, &object).await;

        let url = public_url(&self.public_base_url, &self.optimized_bucket, &alias_path);
        tracing::info!(image_uuid, city, entity_id, url, "image optimized");
        Ok(OptimizedImage {
            url,
            alias_path,
            derivatives,
            source: object,
        })
    }

    async fn upload(&self, path: &str, data: Vec<u8>) -> Result<(), OptimizeError> {
        self.blobs
            .upload(&self.optimized_bucket, path, data, WEBP)
            .await
            .map_err(|source| OptimizeError::Upload {
                path: path.to_string(),
                source,
            })
    }
}

/// Decode once, then resize and encode every width in parallel.
fn render_derivatives(
    object: &str,
    bytes: &[u8],
    widths: &[u32],
    quality: Quality,
) -> Result<Vec<Encoded>, OptimizeError> {
    let img = decode(bytes).map_err(|source| OptimizeError::Decode {
        object: object.to_string(),
        source,
    })?;

    let dims = (img.width(), img.height());
    if let Some(&width) = widths.iter().find(|&&w| !fits_webp(dims, w)) {
        return Err(OptimizeError::TooLarge {
            object: object.to_string(),
            source_width: dims.0,
            source_height: dims.1,
            width,
            height: scaled_height(dims, width),
            max: WEBP_MAX_DIMENSION,
        });
    }

    widths
        .par_iter()
        .map(|&width| {
            let resized = resize_to_width(&img, width);
            let webp = encode_webp(&resized, quality)
                .map_err(|source| OptimizeError::Encode { width, source })?;
            Ok(Encoded {
                width,
                height: resized.height(),
                webp,
            })
        })
        .collect()
}
