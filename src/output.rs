//! CLI output formatting.
//!
//! Output is information-first: every entity leads with its positional
//! index and title, with identifiers and details on indented context lines.
//!
//! # Output Format
//!
//! ## Index
//!
//! ```text
//! Index (3 stories, 1 error)
//! 001 Iceland
//!     Story: iceland-2019
//!     Date: 2019-08-14
//!     Description: Ten days around the ring road.
//!     Thumbnail: iceland-2019/IMG_0413.3fa9c01b.w100.jpg
//! 002 broken
//!     Error: Story 'broken' is malformed: Expected exactly one title, found 0
//! ```
//!
//! ## Story
//!
//! ```text
//! Iceland (2 pictures)
//!     Story: iceland-2019
//!     Date: 2019-08-14
//!     001 IMG_0412 (4000x3000)
//!         Hash: 3fa9c01b
//!         Caption: Arriving at Keflavík.
//!         Camera: f2.8 1/250 35mm ISO 400
//!     002 IMG_0413 (3000x4000) cover
//!         Hash: 71c0e2d4
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::cache::CacheStats;
use crate::index::{FolderEntry, IndexEvent, IndexPage};
use crate::site::PictureResponse;
use crate::types::{CompiledStory, PhotoMetadata, PictureRecord};

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
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
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Plain-text, single-line preview of a markup fragment.
fn preview(markup: &str) -> String {
    let text = strip_html_tags(markup);
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_desc(&joined, 60)
}

fn count(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

fn stories(n: usize) -> String {
    count(n, "story", "stories")
}

// ============================================================================
// Index
// ============================================================================

/// Format one progress event of an index rebuild.
pub fn format_index_event(event: &IndexEvent) -> String {
    match event {
        IndexEvent::Started { total } => format!("Rebuilding index ({})", stories(*total)),
        IndexEvent::Folder {
            name,
            position,
            total,
        } => format!("    [{}/{}] {}", position, total, name),
        IndexEvent::Finished { entries, errors } => format!(
            "Indexed {}, {}",
            stories(*entries),
            count(*errors, "error", "errors")
        ),
    }
}

/// Format the built index.
pub fn format_index_summary(page: &IndexPage) -> Vec<String> {
    let summary = &page.summary;
    let total = summary.len();
    let errors = summary.error_count();

    let mut lines = vec![match errors {
        0 => format!("Index ({})", stories(total)),
        _ => format!(
            "Index ({}, {})",
            stories(total),
            count(errors, "error", "errors")
        ),
    }];

    for (i, entry) in summary.entries.iter().enumerate() {
        match entry {
            FolderEntry::Story {
                name,
                date,
                title,
                description,
                thumbnail,
                ..
            } => {
                lines.push(format!("{} {}", format_index(i + 1), title));
                lines.push(format!("    Story: {}", name));
                if let Some(date) = date {
                    lines.push(format!("    Date: {}", date));
                }
                let desc = preview(description);
                if !desc.is_empty() {
                    lines.push(format!("    Description: {}", desc));
                }
                lines.push(format!("    Thumbnail: {}", thumbnail.url));
            }
            FolderEntry::Error { name, message, .. } => {
                lines.push(format!("{} {}", format_index(i + 1), name));
                lines.push(format!("    Error: {}", message));
            }
        }
    }
    lines
}

pub fn print_index_summary(page: &IndexPage) {
    for line in format_index_summary(page) {
        println!("{}", line);
    }
}

// ============================================================================
// Story
// ============================================================================

fn camera_line(meta: &PhotoMetadata) -> Option<String> {
    let mut parts: Vec<String> = [&meta.aperture, &meta.shutter_speed, &meta.focal_length]
        .into_iter()
        .flatten()
        .cloned()
        .collect();
    if let Some(iso) = meta.iso {
        parts.push(format!("ISO {}", iso));
    }
    (!parts.is_empty()).then(|| parts.join(" "))
}

fn picture_lines(position: usize, picture: &PictureRecord) -> Vec<String> {
    let mut header = format!(
        "    {} {} ({}x{})",
        format_index(position),
        picture.stem,
        picture.width,
        picture.height
    );
    if picture.index {
        header.push_str(" cover");
    }

    let mut lines = vec![header, format!("        Hash: {}", picture.hash)];
    if let Some(caption) = &picture.caption {
        lines.push(format!("        Caption: {}", preview(caption)));
    }
    if let Some(meta) = &picture.metadata {
        if let Some(date) = &meta.capture_date {
            lines.push(format!("        Taken: {}", date));
        }
        if let Some(camera) = camera_line(meta) {
            lines.push(format!("        Camera: {}", camera));
        }
        if let Some(gps) = &meta.gps {
            lines.push(format!("        Location: {}", gps.display));
        }
    }
    lines
}

/// Format a compiled story with its pictures.
pub fn format_story(story: &CompiledStory) -> Vec<String> {
    let mut lines = vec![
        format!(
            "{} ({})",
            story.title,
            count(story.pictures.len(), "picture", "pictures")
        ),
        format!("    Story: {}", story.name),
    ];
    if let Some(date) = story.date {
        lines.push(format!("    Date: {}", date));
    }
    let desc = preview(&story.description);
    if !desc.is_empty() {
        lines.push(format!("    Description: {}", desc));
    }
    for (i, picture) in story.pictures.iter().enumerate() {
        lines.extend(picture_lines(i + 1, picture));
    }
    lines
}

pub fn print_story(story: &CompiledStory) {
    for line in format_story(story) {
        println!("{}", line);
    }
}

// ============================================================================
// Check / warm / picture
// ============================================================================

/// Format per-story check results: `Ok(picture count)` or the error text.
pub fn format_check(results: &[(String, Result<usize, String>)]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut failed = 0;
    for (name, result) in results {
        match result {
            Ok(pictures) => lines.push(format!("ok    {} ({})", name, count(*pictures, "picture", "pictures"))),
            Err(message) => {
                failed += 1;
                lines.push(format!("FAIL  {}", name));
                lines.push(format!("    {}", message));
            }
        }
    }
    lines.push(format!(
        "Checked {}, {} failed",
        stories(results.len()),
        failed
    ));
    lines
}

pub fn print_check(results: &[(String, Result<usize, String>)]) {
    for line in format_check(results) {
        println!("{}", line);
    }
}

/// Format warm results: renditions per story, then overall cache stats.
pub fn format_warm(results: &[(String, Result<usize, String>)], stats: &CacheStats) -> Vec<String> {
    let mut lines: Vec<String> = results
        .iter()
        .map(|(name, result)| match result {
            Ok(n) => format!("{}: {}", name, count(*n, "rendition", "renditions")),
            Err(message) => format!("{}: failed: {}", name, message),
        })
        .collect();
    lines.push(format!("Renditions: {}", stats));
    lines
}

pub fn print_warm(results: &[(String, Result<usize, String>)], stats: &CacheStats) {
    for line in format_warm(results, stats) {
        println!("{}", line);
    }
}

pub fn format_picture(response: &PictureResponse) -> String {
    match response {
        PictureResponse::Ready(path) => path.display().to_string(),
        PictureResponse::Moved(filename) => format!("Moved \u{2192} {}", filename),
    }
}
