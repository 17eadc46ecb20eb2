//! Service configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! serialised to a TOML table and the user's file is merged on top, so a
//! config file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [storage]
//! backend = "local"            # "local" | "memory" | "gcs"
//! root = "storage"             # local backend: one directory per bucket
//! staging_bucket = "staging"
//! optimized_bucket = "optimized"
//! public_base_url = "https://storage.googleapis.com"
//!
//! [database]
//! url = "sqlite://ride-assets.db?mode=rwc"
//!
//! [images]
//! widths = [400, 800, 1200]    # ascending; the largest doubles as *_optimized.webp
//! quality = 85                 # WebP quality (1-100)
//!
//! [markers]
//! size = 64                    # marker edge in pixels
//! padding = 2                  # gap after each spritesheet cell
//! style = "plain"              # "plain" | "teardrop"
//! color = "#3B82F6"            # teardrop body colour
//!
//! [processing]
//! timeout_secs = 60            # deadline for one pipeline call
//! max_processes = 4            # rayon workers for encodes (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{HexColor, MarkerStyle, Quality};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Object storage backend and bucket names.
    pub storage: StorageConfig,
    /// Relational store connection.
    pub database: DatabaseConfig,
    /// Photo derivative settings.
    pub images: ImagesConfig,
    /// Marker and spritesheet settings.
    pub markers: MarkersConfig,
    pub processing: ProcessingConfig,
}

impl AppConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.staging_bucket.trim().is_empty()
            || self.storage.optimized_bucket.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "storage bucket names must not be empty".into(),
            ));
        }
        if self.images.quality == 0 || self.images.quality > 100 {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        if self.images.widths.is_empty() {
            return Err(ConfigError::Validation(
                "images.widths must not be empty".into(),
            ));
        }
        if self.images.widths.contains(&0) {
            return Err(ConfigError::Validation(
                "images.widths values must be non-zero".into(),
            ));
        }
        if self.images.widths.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::Validation(
                "images.widths must be strictly ascending".into(),
            ));
        }
        if self.markers.size == 0 {
            return Err(ConfigError::Validation(
                "markers.size must be non-zero".into(),
            ));
        }
        if let Err(e) = self.markers.color.parse::<HexColor>() {
            return Err(ConfigError::Validation(format!("markers.color: {e}")));
        }
        if self.processing.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "processing.timeout_secs must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Memory,
    Gcs,
}

/// Object storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory for the `local` backend.
    pub root: String,
    /// Bucket holding raw uploads.
    pub staging_bucket: String,
    /// Bucket holding derivatives, markers and spritesheets.
    pub optimized_bucket: String,
    /// Prefix for public object URLs.
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            root: "storage".to_string(),
            staging_bucket: "staging".to_string(),
            optimized_bucket: "optimized".to_string(),
            public_base_url: "https://storage.googleapis.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// sqlx connection URL.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://ride-assets.db?mode=rwc".to_string(),
        }
    }
}

/// Photo derivative settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Target widths in pixels, ascending.
    pub widths: Vec<u32>,
    /// WebP encoding quality (1 = worst, 100 = best).
    pub quality: u32,
}

impl ImagesConfig {
    pub fn quality(&self) -> Quality {
        Quality::new(self.quality)
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            widths: vec![400, 800, 1200],
            quality: 85,
        }
    }
}

/// Marker and spritesheet settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarkersConfig {
    /// Marker edge length in pixels.
    pub size: u32,
    /// Gap after each spritesheet cell, in pixels.
    pub padding: u32,
    pub style: MarkerStyle,
    /// Teardrop body colour as `#RRGGBB`.
    pub color: String,
}

impl Default for MarkersConfig {
    fn default() -> Self {
        Self {
            size: 64,
            padding: 2,
            style: MarkerStyle::Plain,
            color: HexColor::DEFAULT_MARKER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Deadline applied to a whole pipeline call.
    pub timeout_secs: u64,
    /// Maximum number of parallel encode workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

impl ProcessingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_processes: None,
        }
    }
}

/// Resolve the effective encode thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)`
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(AppConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key-by-key; any other overlay value replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<AppConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: AppConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to stock defaults when it is absent.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# ride-assets configuration
# =========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Object storage
# ---------------------------------------------------------------------------
[storage]
# "local" keeps each bucket in a directory under `root`,
# "memory" is for tests and dry runs,
# "gcs" uses Google Cloud Storage with credentials from the environment.
backend = "local"
root = "storage"

# Raw uploads land here, keyed by {imageUUID}.{ext}.
staging_bucket = "staging"

# Derivatives, individual markers and spritesheets are written here.
optimized_bucket = "optimized"

# Public URLs are built as {public_base_url}/{bucket}/{path}.
public_base_url = "https://storage.googleapis.com"

# ---------------------------------------------------------------------------
# Database
# ---------------------------------------------------------------------------
[database]
url = "sqlite://ride-assets.db?mode=rwc"

# ---------------------------------------------------------------------------
# Photo derivatives
# ---------------------------------------------------------------------------
[images]
# Target widths, strictly ascending. The largest is also written as
# {id}_optimized.webp and its URL is what callers receive.
widths = [400, 800, 1200]

# WebP encoding quality (1 = worst, 100 = best).
quality = 85

# ---------------------------------------------------------------------------
# Markers and spritesheets
# ---------------------------------------------------------------------------
[markers]
# Edge length of each marker in pixels.
size = 64

# Gap after each spritesheet cell, in pixels.
padding = 2

# "plain" fits the upload into the square as-is.
# "teardrop" draws a coloured pin with the upload inset as a circle.
style = "plain"

# Teardrop body colour.
color = "#3B82F6"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Deadline for one optimize call, in seconds.
timeout_secs = 60

# Maximum parallel encode workers. Omit for auto (= number of CPU cores).
# Values above the core count are clamped down.
# max_processes = 4
"##
}
