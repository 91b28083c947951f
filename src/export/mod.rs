//! Export stage: persists extracted chapters and images to a directory.
//!
//! One file per chapter, numbered in reading order; image resources are
//! written path-preserving so rewritten Markdown links stay valid.

mod convert;

pub use convert::{HtmlConverter, OutputFormat, PandocConverter, plain_text};

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use log::{debug, info, warn};

use crate::book::Book;
use crate::error::{Error, Result};
use crate::extract;

/// An `<img>` tag with its src attribute captured.
static IMG_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<img[^>]*src=["']([^"']+)["'][^>]*>"#).unwrap());

/// The alt attribute within a tag.
static ALT_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)alt=["']([^"']*)["']"#).unwrap());

/// Characters not allowed in portable filenames.
static ILLEGAL_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap());

/// Runs of whitespace.
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// What an export run produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportReport {
    pub chapters: usize,
    pub images: usize,
    /// Chapters written via the plain-text fallback after a converter failure.
    pub fallbacks: usize,
}

/// Export every chapter of `book` into `out_dir`.
///
/// Chapters are extracted, converted with `converter`, and written as
/// `NN_<title>.<ext>`. Image resources are exported first, path-preserving,
/// and `<img>` references are rewritten to Markdown image links. A chapter
/// whose conversion fails is written via the plain-text fallback instead;
/// only a completely empty extraction aborts the run.
pub fn export_book(
    book: &Book,
    out_dir: &Path,
    format: OutputFormat,
    converter: &dyn HtmlConverter,
) -> Result<ExportReport> {
    let chapters = extract::chapters(book);
    if chapters.is_empty() {
        return Err(Error::NoChapters);
    }
    info!("extracted {} chapters", chapters.len());

    fs::create_dir_all(out_dir)?;

    let image_paths = export_images(book, out_dir)?;
    let mut report = ExportReport {
        images: image_paths.len(),
        ..Default::default()
    };

    for (index, chapter) in chapters.iter().enumerate() {
        let content = match format {
            OutputFormat::Markdown => rewrite_image_links(&chapter.content, &image_paths),
            OutputFormat::Plain => chapter.content.clone(),
        };

        let converted = match converter.convert(&content, format) {
            Ok(converted) => converted,
            Err(e) => {
                warn!(
                    "converting {:?} failed ({e}), falling back to plain text",
                    chapter.title
                );
                report.fallbacks += 1;
                plain_text(&content)
            }
        };

        let filename = format!(
            "{:02}_{}.{}",
            index + 1,
            sanitize_filename(&chapter.title),
            format.extension()
        );
        fs::write(out_dir.join(&filename), converted)?;
        debug!("wrote {filename}");
        report.chapters += 1;
    }

    Ok(report)
}

/// Write every image resource under `out_dir`, preserving its archive path.
///
/// Returns the mapping from archive href to exported path. Individual image
/// failures are logged and skipped.
fn export_images(book: &Book, out_dir: &Path) -> Result<HashMap<String, String>> {
    let mut paths = HashMap::new();

    for image in book.images() {
        let target = out_dir.join(&image.href);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::write(&target, &image.data) {
            Ok(()) => {
                debug!("exported image {}", image.href);
                paths.insert(image.href.clone(), image.href.clone());
            }
            Err(e) => warn!("could not export image {}: {e}", image.href),
        }
    }

    Ok(paths)
}

/// Rewrite `<img>` tags as Markdown image links.
///
/// Leading `../` segments are stripped from the src so links resolve against
/// the export directory, where images are written path-preserving.
pub fn rewrite_image_links(html: &str, images: &HashMap<String, String>) -> String {
    IMG_TAG
        .replace_all(html, |caps: &Captures<'_>| {
            let tag = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            let mut src = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            while let Some(rest) = src.strip_prefix("../") {
                src = rest;
            }

            let alt = ALT_ATTR
                .captures(tag)
                .and_then(|a| a.get(1))
                .map(|m| m.as_str())
                .filter(|alt| !alt.is_empty())
                .unwrap_or("Image");

            let path = images.get(src).map(String::as_str).unwrap_or(src);
            format!("![{alt}]({path})")
        })
        .into_owned()
}

/// Make a chapter title usable as a filename: illegal characters replaced,
/// whitespace collapsed, surrounding dots trimmed, length capped.
pub fn sanitize_filename(name: &str) -> String {
    let replaced = ILLEGAL_CHARS.replace_all(name, "_");
    let collapsed = WHITESPACE_RUN.replace_all(&replaced, " ");
    let trimmed = collapsed.trim().trim_matches('.');

    let capped: String = trimmed.chars().take(100).collect();
    if capped.is_empty() {
        "untitled".to_string()
    } else {
        capped
    }
}
