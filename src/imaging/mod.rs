//! Image processing: decode anything, emit WebP derivatives and PNG markers.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::load_from_memory` |
//! | **Resize → WebP** | Lanczos3 + libwebp lossy encoder |
//! | **Marker** | fit-to-square or teardrop + circular mask, PNG |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension and grid math (unit testable)
//! - **Parameters**: Quality, marker style, colours
//! - **Codec**: bytes ↔ pixels
//! - **Geometry**: resize, mask, composite
//! - **Render**: [`MarkerRenderer`] strategies

pub mod calculations;
pub mod codec;
pub mod geometry;
mod params;
pub mod render;

pub use calculations::GridLayout;
pub use codec::{CodecError, decode, encode_png, encode_webp};
pub use params::{HexColor, InvalidColor, MarkerStyle, Quality};
pub use render::{MarkerRenderer, PlainMarker, TeardropMarker, renderer_for};
