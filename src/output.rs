//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Optimize
//!
//! The trigger response is printed as a single JSON line on stdout so the
//! command can be scripted; logs go to stderr.
//!
//! ```text
//! {"success":true,"imageURL":"https://storage.googleapis.com/optimized/pdx/rides/r42/r42_optimized.webp"}
//! ```
//!
//! ## Rebuild
//!
//! ```text
//! pdx → sprites/pdx/markers.png (2x2, 132x132)
//!     001 blue-team
//!     002 red-rose
//!     003 zebra
//!     Omitted: lost-key
//! Metadata → sprites/pdx/markers.json
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>` or
//! `String`) for testability and a `print_*` wrapper that writes to stdout.
//! Format functions are pure.

use crate::config::AppConfig;
use crate::pipeline::OptimizeResponse;
use crate::sprites::SheetReport;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Compact JSON for one trigger response.
pub fn format_response(response: &OptimizeResponse) -> String {
    // A struct of strings and a bool always serializes.
    serde_json::to_string(response).unwrap_or_else(|_| {
        format!(
            r#"{{"success":{},"imageURL":"{}"}}"#,
            response.success, response.image_url
        )
    })
}

pub fn print_response(response: &OptimizeResponse) {
    println!("{}", format_response(response));
}

/// Format a rebuilt spritesheet: grid summary, markers in atlas order,
/// then anything that had to be left out.
pub fn format_sheet_report(report: &SheetReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{} \u{2192} {} ({}x{}, {}x{})",
        report.city, report.png_path, report.cols, report.rows, report.width, report.height
    )];
    for (i, key) in report.markers.iter().enumerate() {
        lines.push(format!("{}{} {}", indent(1), format_index(i + 1), key));
    }
    if !report.omitted.is_empty() {
        lines.push(format!("{}Omitted: {}", indent(1), report.omitted.join(", ")));
    }
    lines.push(format!("Metadata \u{2192} {}", report.json_path));
    lines
}

pub fn print_sheet_report(report: &SheetReport) {
    for line in format_sheet_report(report) {
        println!("{}", line);
    }
}

/// Summary of a validated configuration.
pub fn format_config_summary(config: &AppConfig) -> Vec<String> {
    let widths: Vec<String> = config.images.widths.iter().map(u32::to_string).collect();
    vec![
        "Config OK".to_string(),
        format!("{}Storage: {:?}", indent(1), config.storage.backend),
        format!(
            "{}Buckets: {} \u{2192} {}",
            indent(1),
            config.storage.staging_bucket,
            config.storage.optimized_bucket
        ),
        format!("{}Database: {}", indent(1), config.database.url),
        format!(
            "{}Widths: {} @ q{}",
            indent(1),
            widths.join(", "),
            config.images.quality
        ),
        format!(
            "{}Markers: {:?} {}px, padding {}",
            indent(1),
            config.markers.style,
            config.markers.size,
            config.markers.padding
        ),
        format!("{}Timeout: {}s", indent(1), config.processing.timeout_secs),
    ]
}

pub fn print_config_summary(config: &AppConfig) {
    for line in format_config_summary(config) {
        println!("{}", line);
    }
}
