//! Trigger handling: from an upload notification to a persisted URL.
//!
//! ```text
//! {imageUUID, cityCode, entityID, entityType}
//!     │  validate (no I/O)
//!     ▼
//! Upload::Ride ────────► Optimizer::process ──► catalog.update_image_url
//! Upload::GroupMarker ─► MarkerPipeline::process_marker
//! ```
//!
//! The whole call runs under `processing.timeout_secs`. Work already
//! uploaded when the deadline hits stays in place; every path is
//! deterministic, so a retry simply redoes it.

use crate::catalog::{CatalogError, GroupCatalog, SqliteCatalog};
use crate::config::AppConfig;
use crate::imaging::renderer_for;
use crate::layout::{EntityKind, UnknownEntityKind};
use crate::marker::{MarkerError, MarkerPipeline};
use crate::optimizer::{OptimizeError, Optimizer};
use crate::sprites::Synchronizer;
use crate::storage::{BlobStore, ObjectStoreBlobs, StorageError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("missing required fields: imageUUID, cityCode, entityID, entityType")]
    MissingFields,
    #[error(transparent)]
    UnknownEntityType(#[from] UnknownEntityKind),
    #[error("failed to process image: {0}")]
    Optimize(#[from] OptimizeError),
    #[error("failed to process marker: {0}")]
    Marker(#[from] MarkerError),
    #[error("image processed but failed to update database: {0}")]
    Persist(#[source] CatalogError),
    #[error("processing exceeded {}s deadline", .0.as_secs())]
    DeadlineExceeded(Duration),
    #[error("storage setup failed: {0}")]
    Storage(#[from] StorageError),
    #[error("database setup failed: {0}")]
    Catalog(#[from] CatalogError),
}

impl PipelineError {
    /// Rejected before any I/O because the request itself is malformed.
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, Self::MissingFields | Self::UnknownEntityType(_))
    }
}

/// Upload notification as received from the web layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerPayload {
    #[serde(rename = "imageUUID")]
    pub image_uuid: String,
    #[serde(rename = "cityCode")]
    pub city_code: String,
    #[serde(rename = "entityID")]
    pub entity_id: String,
    #[serde(rename = "entityType")]
    pub entity_type: String,
}

/// A validated upload, one variant per pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upload {
    Ride {
        image_uuid: String,
        city: String,
        ride_id: String,
    },
    GroupMarker {
        image_uuid: String,
        city: String,
        group_code: String,
    },
}

impl TryFrom<&TriggerPayload> for Upload {
    type Error = PipelineError;

    fn try_from(p: &TriggerPayload) -> Result<Self, Self::Error> {
        let fields = [&p.image_uuid, &p.city_code, &p.entity_id, &p.entity_type];
        if fields.iter().any(|f| f.trim().is_empty()) {
            return Err(PipelineError::MissingFields);
        }
        let image_uuid = p.image_uuid.clone();
        let city = p.city_code.clone();
        Ok(match p.entity_type.parse::<EntityKind>()? {
            EntityKind::Ride => Upload::Ride {
                image_uuid,
                city,
                ride_id: p.entity_id.clone(),
            },
            EntityKind::Group => Upload::GroupMarker {
                image_uuid,
                city,
                group_code: p.entity_id.clone(),
            },
        })
    }
}

/// JSON reply: `{"success": bool, "imageURL": string, "error"?: string}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizeResponse {
    pub success: bool,
    #[serde(rename = "imageURL")]
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OptimizeResponse {
    pub fn ok(image_url: String) -> Self {
        Self {
            success: true,
            image_url,
            error: None,
        }
    }

    pub fn failed(err: &PipelineError) -> Self {
        Self {
            success: false,
            image_url: String::new(),
            error: Some(err.to_string()),
        }
    }
}

/// Everything needed to serve triggers, built once at startup.
pub struct Pipeline {
    optimizer: Optimizer,
    markers: MarkerPipeline,
    sprites: Arc<Synchronizer>,
    catalog: Arc<dyn GroupCatalog>,
    timeout: Duration,
}

impl Pipeline {
    /// Wire the pipelines over explicit storage and catalog clients.
    pub fn new(config: &AppConfig, blobs: Arc<dyn BlobStore>, catalog: Arc<dyn GroupCatalog>) -> Self {
        let storage = &config.storage;
        let sprites = Arc::new(Synchronizer::new(
            Arc::clone(&blobs),
            Arc::clone(&catalog),
            storage.optimized_bucket.clone(),
            &config.markers,
        ));
        let renderer = Arc::from(renderer_for(config.markers.style, &config.markers.color));

        let optimizer = Optimizer::new(
            Arc::clone(&blobs),
            storage.staging_bucket.clone(),
            storage.optimized_bucket.clone(),
            storage.public_base_url.clone(),
            config.images.widths.clone(),
            config.images.quality(),
        );
        let markers = MarkerPipeline::new(
            blobs,
            Arc::clone(&catalog),
            Arc::clone(&sprites),
            renderer,
            storage.staging_bucket.clone(),
            storage.optimized_bucket.clone(),
            storage.public_base_url.clone(),
        );

        Self {
            optimizer,
            markers,
            sprites,
            catalog,
            timeout: config.processing.timeout(),
        }
    }

    /// Open the configured object store and database, then wire the pipelines.
    pub async fn connect(config: &AppConfig) -> Result<Self, PipelineError> {
        let blobs = Arc::new(ObjectStoreBlobs::from_config(&config.storage)?);
        let catalog = Arc::new(SqliteCatalog::connect(&config.database.url).await?);
        tracing::info!(
            backend = ?config.storage.backend,
            staging = %config.storage.staging_bucket,
            optimized = %config.storage.optimized_bucket,
            "pipeline ready"
        );
        Ok(Self::new(config, blobs, catalog))
    }

    pub fn sprites(&self) -> &Synchronizer {
        &self.sprites
    }

    /// Run a trigger and always produce a response.
    pub async fn handle(&self, payload: &TriggerPayload) -> OptimizeResponse {
        match self.run(payload).await {
            Ok(url) => OptimizeResponse::ok(url),
            Err(err) => {
                tracing::error!(image_uuid = %payload.image_uuid, %err, "optimize request failed");
                OptimizeResponse::failed(&err)
            }
        }
    }

    /// Validate, dispatch under the deadline, and return the resulting URL.
    pub async fn run(&self, payload: &TriggerPayload) -> Result<String, PipelineError> {
        let upload = Upload::try_from(payload)?;
        tokio::time::timeout(self.timeout, self.dispatch(upload))
            .await
            .map_err(|_| PipelineError::DeadlineExceeded(self.timeout))?
    }

    pub async fn dispatch(&self, upload: Upload) -> Result<String, PipelineError> {
        match upload {
            Upload::Ride {
                image_uuid,
                city,
                ride_id,
            } => {
                let optimized = self
                    .optimizer
                    .process(&image_uuid, &city, EntityKind::Ride, &ride_id)
                    .await?;
                self.catalog
                    .update_image_url(EntityKind::Ride, &ride_id, &optimized.url)
                    .await
                    .map_err(PipelineError::Persist)?;
                tracing::info!(%image_uuid, %ride_id, url = %optimized.url, "ride image stored");
                Ok(optimized.url)
            }
            Upload::GroupMarker {
                image_uuid,
                city,
                group_code,
            } => {
                let processed = self
                    .markers
                    .process_marker(&image_uuid, &city, &group_code)
                    .await?;
                Ok(processed.url)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{MockBlobStore, MockCatalog, jpeg_bytes, png_bytes};

    fn payload(uuid: &str, city: &str, id: &str, kind: &str) -> TriggerPayload {
        TriggerPayload {
            image_uuid: uuid.into(),
            city_code: city.into(),
            entity_id: id.into(),
            entity_type: kind.into(),
        }
    }

    fn pipeline(blobs: Arc<MockBlobStore>, catalog: Arc<MockCatalog>) -> Pipeline {
        Pipeline::new(&AppConfig::default(), blobs, catalog)
    }

    #[test]
    fn payload_uses_wire_field_names() {
        let p: TriggerPayload = serde_json::from_str(
            r#"{"imageUUID":"u1","cityCode":"pdx","entityID":"r42","entityType":"ride"}"#,
        )
        .unwrap();
        assert_eq!(p, payload("u1", "pdx", "r42", "ride"));
    }

    #[test]
    fn upload_variants() {
        assert_eq!(
            Upload::try_from(&payload("u1", "pdx", "r42", "ride")).unwrap(),
            Upload::Ride {
                image_uuid: "u1".into(),
                city: "pdx".into(),
                ride_id: "r42".into(),
            }
        );
        assert_eq!(
            Upload::try_from(&payload("u1", "pdx", "BLUE", "group")).unwrap(),
            Upload::GroupMarker {
                image_uuid: "u1".into(),
                city: "pdx".into(),
                group_code: "BLUE".into(),
            }
        );
    }

    #[test]
    fn missing_fields_rejected() {
        let p: TriggerPayload = serde_json::from_str(r#"{"imageUUID":"u1"}"#).unwrap();
        let err = Upload::try_from(&p).unwrap_err();
        assert!(matches!(err, PipelineError::MissingFields));
        assert!(err.is_invalid_request());
    }

    #[test]
    fn unknown_entity_type_rejected() {
        let err = Upload::try_from(&payload("u1", "pdx", "e1", "event")).unwrap_err();
        assert_eq!(err.to_string(), "entityType must be 'ride' or 'group', got 'event'");
        assert!(err.is_invalid_request());
    }

    #[test]
    fn response_json_shape() {
        let ok = serde_json::to_value(OptimizeResponse::ok("https://x/y.webp".into())).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true, "imageURL": "https://x/y.webp"}));

        let failed = serde_json::to_value(OptimizeResponse::failed(&PipelineError::MissingFields)).unwrap();
        assert_eq!(failed["success"], false);
        assert_eq!(failed["imageURL"], "");
        assert!(failed["error"].as_str().unwrap().starts_with("missing required fields"));
    }

    #[tokio::test]
    async fn unknown_entity_type_does_no_io() {
        let blobs = Arc::new(MockBlobStore::new());
        let catalog = Arc::new(MockCatalog::new());
        let p = pipeline(blobs.clone(), catalog.clone());

        let resp = p.handle(&payload("u1", "pdx", "e1", "event")).await;
        assert!(!resp.success);
        assert!(blobs.get_operations().is_empty());
        assert!(catalog.get_operations().is_empty());
    }

    #[tokio::test]
    async fn ride_upload_persists_url() {
        let blobs = Arc::new(MockBlobStore::new());
        blobs.put("staging", "u1.jpg", jpeg_bytes(400, 300));
        let catalog = Arc::new(MockCatalog::new().with_ride("r42"));
        let p = pipeline(blobs.clone(), catalog.clone());

        let resp = p.handle(&payload("u1", "pdx", "r42", "ride")).await;
        assert!(resp.success, "{resp:?}");
        assert_eq!(
            resp.image_url,
            "https://storage.googleapis.com/optimized/pdx/rides/r42/r42_optimized.webp"
        );
        assert_eq!(catalog.image_url(EntityKind::Ride, "r42"), Some(resp.image_url));
    }

    #[tokio::test]
    async fn ride_without_row_reports_persist_failure() {
        let blobs = Arc::new(MockBlobStore::new());
        blobs.put("staging", "u1.jpg", jpeg_bytes(400, 300));
        let p = pipeline(blobs.clone(), Arc::new(MockCatalog::new()));

        let err = p.run(&payload("u1", "pdx", "r42", "ride")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Persist(_)));
        assert!(err.to_string().starts_with("image processed but failed to update database"));
        assert!(blobs.contains("optimized", "pdx/rides/r42/r42_optimized.webp"));
    }

    #[tokio::test]
    async fn group_upload_returns_sheet_url() {
        let blobs = Arc::new(MockBlobStore::new());
        blobs.put("staging", "u1.png", png_bytes(64, 64, [0, 0, 255, 255]));
        let catalog = Arc::new(MockCatalog::new().with_group("BLUE", "Blue", "pdx", None));
        let p = pipeline(blobs.clone(), catalog.clone());

        let url = p.run(&payload("u1", "pdx", "BLUE", "group")).await.unwrap();
        assert_eq!(url, "https://storage.googleapis.com/optimized/sprites/pdx/markers.png");
        assert!(
            !catalog
                .get_operations()
                .iter()
                .any(|op| matches!(op, crate::test_helpers::CatalogOp::UpdateImageUrl { .. }))
        );
    }

    #[tokio::test]
    async fn missing_staging_object_fails_without_writes() {
        let blobs = Arc::new(MockBlobStore::new());
        let catalog = Arc::new(MockCatalog::new().with_ride("r42"));
        let p = pipeline(blobs.clone(), catalog.clone());

        let resp = p.handle(&payload("ghost", "pdx", "r42", "ride")).await;
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("image not found with known extension"));
        assert!(blobs.uploads().is_empty());
        assert!(catalog.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_enforced() {
        struct Stalled;

        #[async_trait::async_trait]
        impl BlobStore for Stalled {
            async fn exists(&self, _: &str, _: &str) -> Result<bool, StorageError> {
                std::future::pending().await
            }
            async fn download(&self, _: &str, _: &str) -> Result<Vec<u8>, StorageError> {
                std::future::pending().await
            }
            async fn upload(&self, _: &str, _: &str, _: Vec<u8>, _: &str) -> Result<(), StorageError> {
                std::future::pending().await
            }
            async fn delete(&self, _: &str, _: &str) -> Result<(), StorageError> {
                std::future::pending().await
            }
        }

        let mut config = AppConfig::default();
        config.processing.timeout_secs = 2;
        let p = Pipeline::new(&config, Arc::new(Stalled), Arc::new(MockCatalog::new()));

        let err = p.run(&payload("u1", "pdx", "r1", "ride")).await.unwrap_err();
        assert!(matches!(err, PipelineError::DeadlineExceeded(d) if d == Duration::from_secs(2)));
    }
}
