//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Every page is shown by its reading position and entry name, with the
//! grouping folder as a header above it. Positions are 1-based and
//! zero-padded so columns line up in long books.
//!
//! # Output Format
//!
//! ## Scan
//!
//! ```text
//! book.cbz (zip archive, 3 pages)
//! vol1/
//!     001 p1.jpg
//!     002 p2.jpg
//! (root)
//!     003 back.jpg
//! ```
//!
//! ## Convert
//!
//! ```text
//! Converting zip archive (3 pages)
//!     001 p1.jpg
//!         1236x1648
//!     002 p2.jpg (left)
//!         1236x1648
//!     003 back.jpg
//!         1236x1648
//!         Replaced: unreadable page
//! Assembled 4 pages (1 replaced)
//! Wrote 4 pages to out/
//!     Cover: 001 p1.jpg
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for
//! testability and, where the binary needs it, a `print_*` wrapper that writes
//! to stdout. Format functions are pure.

use crate::config::Profile;
use crate::pipeline::{Conversion, PipelineEvent};
use crate::source::{EntryInfo, SourceKind};
use std::path::Path;

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

fn group_label(relative_path: &str) -> String {
    if relative_path.is_empty() {
        "(root)".to_string()
    } else {
        format!("{}/", relative_path)
    }
}

/// Format a page line from its 0-based index.
///
/// ```text
/// 001 p1.jpg
/// 002 spread.jpg (left)
/// ```
fn page_line(index: usize, name: &str, part: u8) -> String {
    let side = match part {
        1 => " (left)",
        2 => " (right)",
        _ => "",
    };
    format!("{} {}{}", format_index(index + 1), name, side)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

// ============================================================================
// Scan
// ============================================================================

/// Format a source listing grouped by folder.
pub fn format_scan_output(input: &Path, kind: SourceKind, entries: &[EntryInfo]) -> Vec<String> {
    let label = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());
    let mut lines = vec![format!(
        "{} ({}, {})",
        label,
        kind,
        plural(entries.len(), "page")
    )];

    let mut current: Option<&str> = None;
    for entry in entries {
        if current != Some(entry.relative_path.as_str()) {
            lines.push(group_label(&entry.relative_path));
            current = Some(&entry.relative_path);
        }
        lines.push(format!(
            "{}{}",
            indent(1),
            page_line(entry.index, &entry.name, 0)
        ));
    }
    lines
}

pub fn print_scan_output(input: &Path, kind: SourceKind, entries: &[EntryInfo]) {
    for line in format_scan_output(input, kind, entries) {
        println!("{}", line);
    }
}

// ============================================================================
// Convert
// ============================================================================

/// Format a single pipeline progress event as display lines.
pub fn format_pipeline_event(event: &PipelineEvent) -> Vec<String> {
    match event {
        PipelineEvent::Started { kind, total } => {
            vec![format!("Converting {} ({})", kind, plural(*total, "page"))]
        }
        PipelineEvent::PageDone {
            index,
            part,
            name,
            width,
            height,
            fallback,
        } => {
            let mut lines = vec![
                format!("{}{}", indent(1), page_line(*index, name, *part)),
                format!("{}{}x{}", indent(2), width, height),
            ];
            if *fallback {
                lines.push(format!("{}Replaced: unreadable page", indent(2)));
            }
            lines
        }
        PipelineEvent::Assembled {
            pages,
            dropped,
            fallbacks,
        } => {
            let mut notes = Vec::new();
            if *dropped > 0 {
                notes.push(format!("{} dropped", plural(*dropped, "blank")));
            }
            if *fallbacks > 0 {
                notes.push(format!("{} replaced", fallbacks));
            }
            let mut line = format!("Assembled {}", plural(*pages, "page"));
            if !notes.is_empty() {
                line.push_str(&format!(" ({})", notes.join(", ")));
            }
            vec![line]
        }
    }
}

/// Format the closing summary of a `convert` run.
pub fn format_convert_summary(conversion: &Conversion, output: &Path) -> Vec<String> {
    let mut lines = vec![format!(
        "Wrote {} to {}/",
        plural(conversion.pages.len(), "page"),
        output.display()
    )];
    if let Some(cover) = conversion.cover() {
        lines.push(format!(
            "{}Cover: {}",
            indent(1),
            page_line(cover.index, &cover.name, cover.part)
        ));
    }
    let fallbacks = conversion.fallback_count();
    if fallbacks > 0 {
        lines.push(format!(
            "{}Replaced: {}",
            indent(1),
            plural(fallbacks, "unreadable page")
        ));
    }
    lines
}

pub fn print_convert_summary(conversion: &Conversion, output: &Path) {
    for line in format_convert_summary(conversion, output) {
        println!("{}", line);
    }
}

// ============================================================================
// Profiles
// ============================================================================

/// One aligned line per device profile.
pub fn format_profiles(profiles: &[Profile]) -> Vec<String> {
    profiles
        .iter()
        .map(|p| {
            format!(
                "{:<6} {:>4}x{:<5} {:<8} {}",
                p.code, p.width, p.height, p.palette, p.description
            )
        })
        .collect()
}
