//! `sprites/{city}/markers.json`: where each marker sits in the atlas.
//!
//! ```json
//! {
//!   "markers": {
//!     "blue": { "x": 0, "y": 0, "width": 64, "height": 64, "path": "pdx/groups/blue/marker.png" }
//!   }
//! }
//! ```

use crate::layout::spritesheet_json_path;
use crate::storage::BlobStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Position of one marker inside the atlas, plus its individual object path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerInfo {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpritesheetMetadata {
    #[serde(default)]
    pub markers: BTreeMap<String, MarkerInfo>,
}

impl SpritesheetMetadata {
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Indented JSON with a trailing newline. Keys come out sorted.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut out = serde_json::to_vec_pretty(self)?;
        out.push(b'\n');
        Ok(out)
    }

    /// Fetch and parse the city's metadata. Returns an empty set if the object
    /// is missing or unreadable; a city without a sheet yet is a valid state.
    pub async fn load(blobs: &dyn BlobStore, bucket: &str, city: &str) -> Self {
        let path = spritesheet_json_path(city);
        let bytes = match blobs.download(bucket, &path).await {
            Ok(b) => b,
            Err(err) => {
                tracing::debug!(city, path, %err, "no existing spritesheet metadata");
                return Self::default();
            }
        };
        match Self::from_json(&bytes) {
            Ok(meta) => meta,
            Err(err) => {
                tracing::warn!(city, path, %err, "unparsable spritesheet metadata, starting empty");
                Self::default()
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.markers.keys().map(String::as_str)
    }
}
