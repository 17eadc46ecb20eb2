//! Pixel geometry: resizing, circular masking and teardrop compositing.
//!
//! Every function takes a decoded image and returns a new one; nothing here
//! touches storage or encoders.

use super::calculations::{center_offset, fit_within_square, scaled_height};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Resize to `width`, preserving the aspect ratio (height rounded to nearest).
pub fn resize_to_width(img: &DynamicImage, width: u32) -> DynamicImage {
    let height = scaled_height(img.dimensions(), width);
    img.resize_exact(width, height, FilterType::Lanczos3)
}

/// Scale into a `size`×`size` square without distortion, centered on a
/// transparent background.
pub fn fit_to_square(img: &DynamicImage, size: u32) -> RgbaImage {
    let (w, h) = fit_within_square(img.dimensions(), size);
    let scaled = img.resize_exact(w, h, FilterType::Lanczos3).to_rgba8();

    let mut canvas = RgbaImage::from_pixel(size, size, TRANSPARENT);
    imageops::replace(
        &mut canvas,
        &scaled,
        center_offset(size, w) as i64,
        center_offset(size, h) as i64,
    );
    canvas
}

/// Square-crop-and-scale to `size`, then clear every pixel outside the
/// inscribed circle.
pub fn circular(img: &DynamicImage, size: u32) -> RgbaImage {
    let mut square = img
        .resize_to_fill(size, size, FilterType::Lanczos3)
        .to_rgba8();
    let radius = size as f64 / 2.0;

    for (x, y, pixel) in square.enumerate_pixels_mut() {
        let dx = x as f64 + 0.5 - radius;
        let dy = y as f64 + 0.5 - radius;
        if (dx * dx + dy * dy).sqrt() > radius {
            *pixel = TRANSPARENT;
        }
    }
    square
}

/// Proportions of the teardrop pin relative to the marker size.
const BODY_CENTER_Y: f64 = 0.38;
const BODY_RADIUS: f64 = 0.32;
const POINT_DEPTH: f64 = 1.95;
const INSET_SCALE: f64 = 1.9;

/// Compose a teardrop pin: a coloured circle in the upper part of the canvas,
/// a triangular point below it, and the user image masked to a circle and
/// centered on the body.
pub fn teardrop(img: &DynamicImage, size: u32, body: Rgba<u8>) -> RgbaImage {
    let mut pin = RgbaImage::from_pixel(size, size, TRANSPARENT);

    let center_x = size as f64 / 2.0;
    let center_y = size as f64 * BODY_CENTER_Y;
    let radius = size as f64 * BODY_RADIUS;
    let point_top = center_y + radius;
    let point_y = center_y + radius * POINT_DEPTH;

    for (x, y, pixel) in pin.enumerate_pixels_mut() {
        let dx = x as f64 - center_x;
        let dy = y as f64 - center_y;
        let fy = y as f64;

        let in_body = (dx * dx + dy * dy).sqrt() <= radius;
        let in_point = fy > point_top
            && fy < point_y
            && dx.abs() <= radius * (point_y - fy) / (point_y - point_top);

        if in_body || in_point {
            *pixel = body;
        }
    }

    let inset_size = ((radius * INSET_SCALE) as u32).max(1);
    let inset = circular(img, inset_size);
    let start_x = center_x as i64 - (inset_size / 2) as i64;
    let start_y = center_y as i64 - (inset_size / 2) as i64;
    imageops::overlay(&mut pin, &inset, start_x, start_y);

    pin
}
