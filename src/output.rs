//! CLI output formatting for all pipeline stages.
//!
//! # Product-First Display
//!
//! Output is organized by product, not by directory. Every product shows its
//! positional index and title, with the release files as indented context
//! lines. Paths appear only where they help trace a file back to disk.
//!
//! # Output Format
//!
//! ## Scan
//!
//! ```text
//! Products
//! 001 OpenStreetMap as vector tiles (2 releases)
//!     The full OpenStreetMap planet as vector tilesets with zoom levels...
//!     Latest: osm.versatiles → osm.20240701.versatiles (54.3 GB)
//!     Older: osm.20240701.versatiles (54.3 GB)
//!     Older: osm.20240325.versatiles (53.9 GB)
//! 002 Hillshading as vector tiles (1 release)
//!     Latest: hillshade-vectors.versatiles (12.0 GB)
//! ```
//!
//! ## Hash
//!
//! ```text
//! Hashes: 2 of 3 files need digests
//! Hashing 66.3 GB
//!     osm.20240701.versatiles: md5, sha256 (81.9%)
//!     hillshade-vectors.versatiles: sha256 (100.0%)
//! ```
//!
//! ## Sync
//!
//! ```text
//! Local cache
//!     kept: osm.20240701.versatiles
//!     deleted: osm.20240325.versatiles
//! ```
//!
//! # Architecture
//!
//! Each stage has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure:
//! no I/O, no side effects.

use crate::group::Group;
use crate::hashes::HashEvent;
use crate::run::RunReport;
use crate::sync::SyncReport;
use crate::types::FileEntry;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// `001 Title (2 releases)`
fn entity_header(index: usize, title: &str, releases: usize) -> String {
    format!("{} {} ({})", format_index(index), title, plural(releases, "release"))
}

/// File name and size; aliases also show the file they point at.
fn file_line(file: &FileEntry) -> String {
    if file.url() == file.name() {
        format!("{} ({})", file.url(), file.size_string())
    } else {
        format!("{} → {} ({})", file.url(), file.name(), file.size_string())
    }
}

/// Strip HTML tags from a string (simple angle-bracket stripping).
fn strip_html_tags(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }
    result
}

/// Truncate text to `max` characters, appending `...` if truncated.
fn truncate_desc(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max).collect();
        format!("{}...", head)
    }
}

fn format_bytes(bytes: u64) -> String {
    format!("{:.1} GB", bytes as f64 / (1u64 << 30) as f64)
}

// ============================================================================
// Scan
// ============================================================================

pub fn format_scan_output(groups: &[Group]) -> Vec<String> {
    let mut lines = vec!["Products".to_string()];
    for (i, group) in groups.iter().enumerate() {
        let releases = group.older.len() + usize::from(!group.is_alias() && group.latest.is_some());
        lines.push(entity_header(i + 1, &group.title, releases));

        let plain = strip_html_tags(&group.description.replace("<br>", " "));
        let truncated = truncate_desc(plain.trim(), 60);
        if !truncated.is_empty() {
            lines.push(format!("{}{}", indent(1), truncated));
        }
        if let Some(latest) = &group.latest {
            lines.push(format!("{}Latest: {}", indent(1), file_line(latest)));
        }
        for file in &group.older {
            lines.push(format!("{}Older: {}", indent(1), file_line(file)));
        }
    }
    if groups.is_empty() {
        lines.push(format!("{}(no release files)", indent(1)));
    }
    lines
}

/// Print scan output to stdout.
pub fn print_scan_output(groups: &[Group]) {
    for line in format_scan_output(groups) {
        println!("{}", line);
    }
}

// ============================================================================
// Hash
// ============================================================================

pub fn format_hash_event(event: &HashEvent) -> Vec<String> {
    match event {
        HashEvent::Checked { files, missing } => {
            vec![format!("Hashes: {} of {} need digests", missing, plural(*files, "file"))]
        }
        HashEvent::Started { total_bytes } => {
            vec![format!("Hashing {}", format_bytes(*total_bytes))]
        }
        HashEvent::FileHashed {
            name,
            kinds,
            progress,
        } => {
            let kinds: Vec<&str> = kinds.iter().map(|k| k.extension()).collect();
            vec![format!(
                "{}{}: {} ({:.1}%)",
                indent(1),
                name,
                kinds.join(", "),
                progress.percent()
            )]
        }
        HashEvent::Finished { computed } => {
            vec![format!("Hashed {}", plural(*computed, "file"))]
        }
    }
}

// ============================================================================
// Sync
// ============================================================================

pub fn format_sync_report(report: &SyncReport) -> Vec<String> {
    let mut lines = vec!["Local cache".to_string()];
    for (label, names) in [
        ("kept", &report.kept),
        ("deleted", &report.deleted),
        ("copied", &report.copied),
    ] {
        for name in names {
            lines.push(format!("{}{}: {}", indent(1), label, name));
        }
    }
    if report.kept.is_empty() && report.is_noop() {
        lines.push(format!("{}(empty)", indent(1)));
    }
    lines
}

// ============================================================================
// Run
// ============================================================================

pub fn format_run_report(report: &RunReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Cataloged {} ({})",
        plural(report.scanned, "file"),
        report.hashes
    )];

    lines.push(String::new());
    lines.push("Products".to_string());
    for (i, group) in report.groups.iter().enumerate() {
        let cached = if group.cached { ", cached locally" } else { "" };
        lines.push(format!(
            "{} {} ({} older{})",
            format_index(i + 1),
            group.title,
            group.older,
            cached
        ));
        if let Some(latest) = &group.latest {
            lines.push(format!("{}Latest: {}", indent(1), latest));
        }
    }

    lines.push(String::new());
    lines.extend(format_sync_report(&report.sync));

    lines.push(String::new());
    lines.push("Artifacts".to_string());
    for url in &report.artifacts {
        lines.push(format!("{}{}{}", indent(1), report.base_url, url));
    }

    lines.push(String::new());
    lines.push(format!(
        "Published {} and {} → {}",
        plural(report.published, "file"),
        plural(report.responses, "checksum"),
        report.nginx_conf.display()
    ));
    lines
}

/// Print the run summary to stdout.
pub fn print_run_report(report: &RunReport) {
    for line in format_run_report(report) {
        println!("{}", line);
    }
}
