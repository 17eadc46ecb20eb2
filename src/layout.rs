//! Object-storage layout.
//!
//! Bucket names are deployment config; the paths inside them are fixed
//! contracts shared with the web clients:
//!
//! ```text
//! staging/
//! └── {uuid}.{ext}                                   # raw upload, any format
//! optimized/
//! ├── {city}/rides/{id}/{id}_400w.webp               # derivatives per width
//! ├── {city}/rides/{id}/{id}_optimized.webp          # alias of the largest width
//! ├── {city}/groups/{marker_key}/marker.png          # individual marker
//! └── sprites/{city}/markers.png|markers.json        # packed atlas + positions
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Staging probe order for photos.
pub const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

/// Staging probe order for markers; PNG first since markers are usually transparent.
pub const MARKER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// The kind of entity an uploaded image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Ride,
    Group,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ride => "ride",
            Self::Group => "group",
        }
    }

    /// Path segment for this kind (`rides`, `groups`).
    pub fn plural(self) -> &'static str {
        match self {
            Self::Ride => "rides",
            Self::Group => "groups",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("entityType must be 'ride' or 'group', got '{0}'")]
pub struct UnknownEntityKind(pub String);

impl FromStr for EntityKind {
    type Err = UnknownEntityKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ride" => Ok(Self::Ride),
            "group" => Ok(Self::Group),
            other => Err(UnknownEntityKind(other.to_string())),
        }
    }
}

/// `{uuid}.{ext}` in the staging bucket.
pub fn staging_object(image_uuid: &str, ext: &str) -> String {
    format!("{image_uuid}.{ext}")
}

/// `{city}/{kind}s/{id}/{id}_{width}w.webp`
pub fn derivative_path(city: &str, kind: EntityKind, entity_id: &str, width: u32) -> String {
    format!(
        "{city}/{}/{entity_id}/{entity_id}_{width}w.webp",
        kind.plural()
    )
}

/// `{city}/{kind}s/{id}/{id}_optimized.webp`, the single-URL alias.
pub fn optimized_alias_path(city: &str, kind: EntityKind, entity_id: &str) -> String {
    format!(
        "{city}/{}/{entity_id}/{entity_id}_optimized.webp",
        kind.plural()
    )
}

/// `{city}/groups/{marker_key}/marker.png`
pub fn marker_path(city: &str, marker_key: &str) -> String {
    format!("{city}/groups/{marker_key}/marker.png")
}

/// `sprites/{city}/markers.png`
pub fn spritesheet_png_path(city: &str) -> String {
    format!("sprites/{city}/markers.png")
}

/// `sprites/{city}/markers.json`
pub fn spritesheet_json_path(city: &str) -> String {
    format!("sprites/{city}/markers.json")
}

/// Rewrite pre-`groups/` marker paths (`{city}/{key}/marker.png`) to the
/// current convention; paths already under `/groups/` are kept verbatim.
pub fn normalize_marker_path(city: &str, marker_key: &str, recorded: &str) -> String {
    if recorded.contains("/groups/") {
        recorded.to_string()
    } else {
        marker_path(city, marker_key)
    }
}

/// `{base}/{bucket}/{path}` with exactly one slash at each join.
pub fn public_url(base: &str, bucket: &str, path: &str) -> String {
    format!(
        "{}/{}/{}",
        base.trim_end_matches('/'),
        bucket.trim_matches('/'),
        path.trim_start_matches('/')
    )
}
