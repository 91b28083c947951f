//! Chapter extraction: turns a loaded [`Book`] into an ordered chapter list.
//!
//! The navigation tree drives extraction when it is usable; the spine is the
//! fallback. Entries that cannot be resolved are logged and skipped, never
//! fatal. The assembled list is post-processed for the degenerate case where
//! every chapter resolved to identical content.

pub mod anchor;
pub mod resplit;

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use log::{debug, warn};

use crate::book::{Book, Chapter, TocEntry};
use crate::util;

/// A heading element of any level, inner markup captured.
static TITLE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h[1-6][^>]*>(.*?)</h[1-6]>").unwrap());

/// The document `<title>` element.
static TITLE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

/// Extract the ordered chapter list from a book.
///
/// Walks the navigation tree in depth-first order, resolving each entry's
/// href (and anchor, if any) to a slice of its target document. When the
/// navigation tree is absent or yields nothing, falls back to whole-document
/// extraction in spine order. The result is post-processed to recover from
/// navigation metadata that failed to differentiate chapters.
///
/// Returns an empty list only when both paths produced nothing.
pub fn chapters(book: &Book) -> Vec<Chapter> {
    let mut chapters = from_toc(book);
    if chapters.is_empty() {
        debug!("navigation yielded no chapters, walking the spine");
        chapters = from_spine(book);
    }
    resplit::postprocess(chapters)
}

/// Flatten the navigation tree depth-first, a node before its children.
pub fn flatten_toc(entries: &[TocEntry]) -> Vec<&TocEntry> {
    fn walk<'a>(entry: &'a TocEntry, out: &mut Vec<&'a TocEntry>) {
        out.push(entry);
        for child in &entry.children {
            walk(child, out);
        }
    }

    let mut out = Vec::new();
    for entry in entries {
        walk(entry, &mut out);
    }
    out
}

/// Assemble chapters by walking the flattened navigation tree.
fn from_toc(book: &Book) -> Vec<Chapter> {
    let entries = flatten_toc(&book.toc);
    let mut chapters: Vec<Chapter> = Vec::new();

    // Targets already turned into a chapter, and resources emitted whole.
    // Authoring tools commonly emit several navigation entries into one
    // physical file; each target is extracted once.
    let mut seen: HashSet<&str> = HashSet::new();
    let mut whole_resources: HashSet<&str> = HashSet::new();

    for (i, entry) in entries.iter().enumerate() {
        let (name, fragment) = anchor::split_href(&entry.href);

        if seen.contains(entry.href.as_str()) {
            debug!("skipping {}: target already extracted", entry.href);
            continue;
        }
        if fragment.is_some() && whole_resources.contains(name) {
            debug!("skipping {}: {name} already extracted whole", entry.href);
            continue;
        }

        let next_href = entries.get(i + 1).map(|next| next.href.as_str());
        let Some(content) = anchor::resolve(book, &entry.href, next_href) else {
            warn!("no content for navigation entry {:?} ({})", entry.title, entry.href);
            continue;
        };
        if content.trim().is_empty() {
            warn!("empty content for navigation entry {:?}, skipping", entry.title);
            continue;
        }

        let title = if entry.title.trim().is_empty() {
            format!("Chapter {}", chapters.len() + 1)
        } else {
            entry.title.clone()
        };

        chapters.push(Chapter {
            title,
            content,
            id: entry.href.clone(),
        });
        seen.insert(&entry.href);
        if fragment.is_none() {
            whole_resources.insert(name);
        }
    }

    chapters
}

/// Assemble one chapter per linear spine document.
///
/// Coarser than navigation-driven extraction (whole file per spine item),
/// but guaranteed to cover the reading order.
fn from_spine(book: &Book) -> Vec<Chapter> {
    let mut chapters = Vec::new();

    for item in &book.spine {
        if !item.linear {
            debug!("skipping non-linear spine item {}", item.idref);
            continue;
        }
        let Some(resource) = book.resource_by_id(&item.idref) else {
            warn!("spine references unknown manifest id {}", item.idref);
            continue;
        };
        if !resource.is_document() {
            debug!("skipping non-document spine item {}", item.idref);
            continue;
        }
        let Some(text) = util::decode_text(&resource.data) else {
            warn!("{} is not decodable text, skipping", resource.href);
            continue;
        };
        if text.trim().is_empty() {
            continue;
        }

        let title = title_from_content(&text)
            .unwrap_or_else(|| format!("Chapter {}", chapters.len() + 1));

        chapters.push(Chapter {
            title,
            content: text.into_owned(),
            id: item.idref.clone(),
        });
    }

    chapters
}

/// Derive a display title from document markup: the first heading, or the
/// `<title>` element, tags stripped and entities decoded.
pub fn title_from_content(content: &str) -> Option<String> {
    for pattern in [&*TITLE_HEADING, &*TITLE_TAG] {
        if let Some(caps) = pattern.captures(content) {
            let title = util::decode_entities(util::strip_tags(&caps[1]).trim());
            let title = title.trim();
            if !title.is_empty() {
                return Some(title.to_string());
            }
        }
    }
    None
}
