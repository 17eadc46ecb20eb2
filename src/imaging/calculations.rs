//! Pure calculation functions for image dimensions and atlas layout.
//!
//! All functions here are pure and testable without any I/O or images.

/// Height that preserves the source aspect ratio at `target_width`.
///
/// Rounded to the nearest pixel and never less than 1.
///
/// # Examples
/// ```
/// # use ride_assets::imaging::calculations::scaled_height;
/// // 4000x3000 landscape at 400px wide → 300px tall
/// assert_eq!(scaled_height((4000, 3000), 400), 300);
/// ```
pub fn scaled_height(source: (u32, u32), target_width: u32) -> u32 {
    let (src_w, src_h) = source;
    if src_w == 0 {
        return 1;
    }
    let h = (src_h as f64 * target_width as f64 / src_w as f64).round() as u32;
    h.max(1)
}

/// Largest edge libwebp can encode.
pub const WEBP_MAX_DIMENSION: u32 = 16_383;

/// Whether `source` resized to `target_width` stays within
/// [`WEBP_MAX_DIMENSION`] on both edges.
pub fn fits_webp(source: (u32, u32), target_width: u32) -> bool {
    target_width <= WEBP_MAX_DIMENSION && scaled_height(source, target_width) <= WEBP_MAX_DIMENSION
}

/// Largest dimensions that fit inside a `bound`×`bound` square while keeping
/// the source aspect ratio. The longer edge always equals `bound`.
pub fn fit_within_square(source: (u32, u32), bound: u32) -> (u32, u32) {
    let (src_w, src_h) = source;
    if src_w == 0 || src_h == 0 {
        return (bound, bound);
    }

    if src_w >= src_h {
        let h = (src_h as f64 * bound as f64 / src_w as f64).round() as u32;
        (bound, h.clamp(1, bound))
    } else {
        let w = (src_w as f64 * bound as f64 / src_h as f64).round() as u32;
        (w.clamp(1, bound), bound)
    }
}

/// Offset that centers an `inner` extent inside an `outer` extent.
pub fn center_offset(outer: u32, inner: u32) -> u32 {
    outer.saturating_sub(inner) / 2
}

/// Grid of equally-sized cells used to pack markers into a spritesheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub cols: u32,
    pub rows: u32,
    /// Edge length of one cell: marker size plus padding.
    pub cell: u32,
}

impl GridLayout {
    /// Layout for `count` markers: `cols = ceil(sqrt(n))`, `rows = ceil(n / cols)`.
    ///
    /// Returns `None` for zero markers; an empty sheet has no valid canvas.
    pub fn for_count(count: u32, marker_size: u32, padding: u32) -> Option<Self> {
        if count == 0 {
            return None;
        }
        let cols = ceil_sqrt(count);
        let rows = count.div_ceil(cols);
        Some(Self {
            cols,
            rows,
            cell: marker_size + padding,
        })
    }

    /// Canvas dimensions `(cols * cell, rows * cell)`.
    pub fn canvas_size(&self) -> (u32, u32) {
        (self.cols * self.cell, self.rows * self.cell)
    }

    /// Top-left pixel of the cell at `index`, filled row-major.
    pub fn origin(&self, index: u32) -> (u32, u32) {
        let col = index % self.cols;
        let row = index / self.cols;
        (col * self.cell, row * self.cell)
    }

    /// Number of cells in the grid; always at least the marker count.
    pub fn capacity(&self) -> u32 {
        self.cols * self.rows
    }
}

/// Smallest `c` with `c * c >= n`.
fn ceil_sqrt(n: u32) -> u32 {
    let mut c = (n as f64).sqrt().ceil() as u32;
    // Float sqrt can land one off for large inputs.
    while (c as u64) * (c as u64) < n as u64 {
        c += 1;
    }
    while c > 1 && ((c - 1) as u64) * ((c - 1) as u64) >= n as u64 {
        c -= 1;
    }
    c
}
