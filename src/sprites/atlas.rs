//! Atlas packing: composite sorted markers onto one grid canvas and describe
//! where each landed.

use super::metadata::{MarkerInfo, SpritesheetMetadata};
use crate::imaging::GridLayout;
use crate::imaging::geometry::fit_to_square;
use image::imageops;
use image::{DynamicImage, RgbaImage};
use std::collections::BTreeMap;

/// One marker ready to be packed.
#[derive(Debug, Clone)]
pub struct SheetEntry {
    pub image: RgbaImage,
    /// Path recorded in the metadata for this marker.
    pub path: String,
}

/// A packed atlas and its metadata, not yet encoded.
#[derive(Debug, Clone)]
pub struct PackedSheet {
    pub canvas: RgbaImage,
    pub metadata: SpritesheetMetadata,
    pub layout: GridLayout,
}

/// Pack `entries` in ascending key order. `None` when there is nothing to pack.
///
/// Markers not already `size`×`size` are fitted into the cell first so a
/// stray legacy image can never bleed into its neighbour.
pub fn pack(entries: &BTreeMap<String, SheetEntry>, size: u32, padding: u32) -> Option<PackedSheet> {
    let layout = GridLayout::for_count(entries.len() as u32, size, padding)?;
    let (width, height) = layout.canvas_size();
    let mut canvas = RgbaImage::new(width, height);
    let mut metadata = SpritesheetMetadata::default();

    for (index, (key, entry)) in entries.iter().enumerate() {
        let (x, y) = layout.origin(index as u32);
        if entry.image.dimensions() == (size, size) {
            imageops::replace(&mut canvas, &entry.image, x as i64, y as i64);
        } else {
            let fitted = fit_to_square(&DynamicImage::ImageRgba8(entry.image.clone()), size);
            imageops::replace(&mut canvas, &fitted, x as i64, y as i64);
        }

        metadata.markers.insert(
            key.clone(),
            MarkerInfo {
                x,
                y,
                width: size,
                height: size,
                path: entry.path.clone(),
            },
        );
    }

    Some(PackedSheet {
        canvas,
        metadata,
        layout,
    })
}
