//! Decoding and encoding: the only place bytes turn into pixels and back.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, WebP) | `image::load_from_memory` (format sniffed from magic bytes) |
//! | Encode → lossy WebP | `webp::Encoder` (libwebp) |
//! | Encode → PNG | `image::codecs::png` via `DynamicImage::write_to` |
//!
//! The `image` crate's own WebP encoder is lossless-only, so lossy output
//! goes through libwebp.

use super::params::Quality;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to decode image ({len} bytes): {source}")]
    Decode {
        len: usize,
        #[source]
        source: image::ImageError,
    },
    #[error("WebP encode failed: {0}")]
    WebP(String),
    #[error("PNG encode failed: {0}")]
    Png(#[source] image::ImageError),
}

/// Decode a full image from bytes of unknown format.
///
/// This is a full decode, not a header probe: truncated or non-image bytes
/// fail here rather than later in the pipeline.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, CodecError> {
    image::load_from_memory(bytes).map_err(|source| CodecError::Decode {
        len: bytes.len(),
        source,
    })
}

/// Best-effort format name for diagnostics; `None` when the magic bytes are unknown.
pub fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Encode as lossy WebP at the given quality.
pub fn encode_webp(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, CodecError> {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(CodecError::WebP(format!(
            "cannot encode empty {width}x{height} image"
        )));
    }
    let encoder = webp::Encoder::from_rgba(rgba.as_raw(), width, height);
    let memory = encoder
        .encode_simple(false, quality.value() as f32)
        .map_err(|e| CodecError::WebP(format!("{e:?}")))?;
    Ok(memory.to_vec())
}

/// Encode as PNG, keeping the alpha channel.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(CodecError::Png)?;
    Ok(buf)
}
