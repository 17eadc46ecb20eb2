//! Marker renderers: turn a decoded upload into a fixed-size map icon.
//!
//! [`PlainMarker`] is the current design. [`TeardropMarker`] is the older
//! coloured-pin look, kept selectable through `markers.style = "teardrop"`.

use super::geometry::{fit_to_square, teardrop};
use super::params::{HexColor, MarkerStyle};
use image::{DynamicImage, RgbaImage};

/// Strategy for producing a `size`×`size` marker raster.
pub trait MarkerRenderer: Send + Sync {
    fn render(&self, source: &DynamicImage, size: u32) -> RgbaImage;
}

/// Fit the upload into the marker square, aspect preserved, no mask.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainMarker;

impl MarkerRenderer for PlainMarker {
    fn render(&self, source: &DynamicImage, size: u32) -> RgbaImage {
        fit_to_square(source, size)
    }
}

/// Coloured teardrop with the upload inset as a circle.
#[derive(Debug, Clone, Copy)]
pub struct TeardropMarker {
    pub color: HexColor,
}

impl MarkerRenderer for TeardropMarker {
    fn render(&self, source: &DynamicImage, size: u32) -> RgbaImage {
        teardrop(source, size, self.color.to_rgba())
    }
}

/// Build the renderer selected by configuration.
///
/// An unparsable colour falls back to [`HexColor::DEFAULT_MARKER`].
pub fn renderer_for(style: MarkerStyle, color: &str) -> Box<dyn MarkerRenderer> {
    match style {
        MarkerStyle::Plain => Box::new(PlainMarker),
        MarkerStyle::Teardrop => {
            let color = color.parse().unwrap_or_else(|err| {
                tracing::warn!(%err, "falling back to default marker color");
                HexColor::DEFAULT_MARKER
            });
            Box::new(TeardropMarker { color })
        }
    }
}
