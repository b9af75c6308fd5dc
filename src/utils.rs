//! Formatting helpers shared by the library's log lines and the CLI

use crate::types::CopyReport;

/// Format a byte count with binary units
///
/// Values below 1024 are printed as whole bytes, larger ones with two
/// decimals.
///
/// # Example
///
/// ```rust
/// use timecopy::utils::format_bytes;
///
/// assert_eq!(format_bytes(1023), "1023 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit = 0;

    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}

/// One-line summary of a report's counters
///
/// Zero counters are left out, except that an empty report reads "nothing
/// to do".
pub fn summarize(report: &CopyReport) -> String {
    let mut parts = Vec::new();
    if report.files_copied > 0 {
        parts.push(format!(
            "{} files ({})",
            report.files_copied,
            format_bytes(report.bytes_copied)
        ));
    }
    let counters = [
        (report.directories_created, "directories"),
        (report.symlinks_created, "symlinks"),
        (report.hard_links, "hard links"),
        (report.attributes_copied, "attribute sets"),
        (report.unsupported_skipped, "unsupported"),
        (report.failed, "failed"),
        (report.consistency_errors, "inconsistent"),
        (report.metadata_warnings, "metadata warnings"),
    ];
    for (count, label) in counters {
        if count > 0 {
            parts.push(format!("{} {}", count, label));
        }
    }

    if parts.is_empty() {
        "nothing to do".to_string()
    } else {
        parts.join(", ")
    }
}
