//! Marker set reconciliation.
//!
//! Three sources disagree about which markers a city has: the spritesheet
//! metadata, the catalog, and the objects actually in storage. The rules:
//!
//! - a metadata entry with a non-empty path is a candidate as recorded;
//! - a catalog key not already covered by metadata is a candidate only when
//!   its standard path was probed and found present;
//! - a candidate whose object later fails to download or decode is dropped
//!   by the caller, so storage has the final word either way.
//!
//! Probing is I/O and happens before this step; [`reconcile`] itself is pure.

use super::metadata::SpritesheetMetadata;
use crate::layout::marker_path;
use std::collections::BTreeMap;

/// Why a marker made it into the valid set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Listed in the existing `markers.json`.
    Metadata,
    /// Active in the catalog and present at its standard path.
    Catalog,
}

/// Result of an existence probe for a catalog key's standard path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageProbe {
    Present,
    Missing,
    /// The probe itself errored; treated as absent for this rebuild.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidMarker {
    /// Object to download the marker image from.
    pub path: String,
    pub provenance: Provenance,
}

/// Markers to load for a rebuild, keyed and ordered by marker key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidMarkerSet {
    entries: BTreeMap<String, ValidMarker>,
}

impl ValidMarkerSet {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&ValidMarker> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ValidMarker)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn count(&self, provenance: Provenance) -> usize {
        self.entries
            .values()
            .filter(|m| m.provenance == provenance)
            .count()
    }
}

/// Catalog keys that need an existence probe: those metadata does not
/// already cover with a usable path.
pub fn keys_to_probe<'a>(metadata: &SpritesheetMetadata, catalog_keys: &'a [String]) -> Vec<&'a str> {
    catalog_keys
        .iter()
        .map(String::as_str)
        .filter(|key| !key.is_empty())
        .filter(|key| {
            metadata
                .markers
                .get(*key)
                .is_none_or(|info| info.path.is_empty())
        })
        .collect()
}

/// Combine metadata entries and probed catalog keys into the set of markers
/// to load.
pub fn reconcile(
    city: &str,
    metadata: &SpritesheetMetadata,
    probes: &[(String, StorageProbe)],
) -> ValidMarkerSet {
    let mut entries = BTreeMap::new();

    for (key, info) in &metadata.markers {
        if key.is_empty() || info.path.is_empty() {
            continue;
        }
        entries.insert(
            key.clone(),
            ValidMarker {
                path: info.path.clone(),
                provenance: Provenance::Metadata,
            },
        );
    }

    for (key, probe) in probes {
        if key.is_empty() || entries.contains_key(key) {
            continue;
        }
        if *probe == StorageProbe::Present {
            entries.insert(
                key.clone(),
                ValidMarker {
                    path: marker_path(city, key),
                    provenance: Provenance::Catalog,
                },
            );
        }
    }

    ValidMarkerSet { entries }
}
