//! Slug generation for marker keys and group public ids.
//!
//! A marker key is the join key between the `ride_groups.marker` column, the
//! spritesheet metadata and the object-storage paths, so every producer must
//! derive it the same way:
//!
//! - `"BLUE"` → `"blue"`
//! - `"Red Rose"` → `"red-rose"`
//! - `"  Bike & Brew!! "` → `"bike-brew"`
//!
//! Lowercase ASCII letters and digits are kept; every other run of characters
//! collapses to a single `-`; leading and trailing dashes are dropped.

/// Convert an arbitrary display string into a URL-safe slug.
pub fn slugify(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut pending_dash = false;

    for ch in lowered.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }

    slug
}
