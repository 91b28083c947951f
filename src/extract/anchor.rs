//! Sub-document anchor resolution.
//!
//! Navigation entries frequently point at `file#fragment` targets rather
//! than whole files. For ordinary `id` fragments the target element can be
//! located directly. Legacy `filepos` fragments encode byte offsets into a
//! pre-conversion source file and cannot be interpreted literally; the only
//! reliable signal is the `id`/`name` marker a converter injected for them,
//! and the only precise end boundary is the start of the *next* navigation
//! target in the same document. When that is unavailable, heading- and
//! class-based heuristics approximate the boundary.

use once_cell::sync::Lazy;
use regex::Regex;

use log::{debug, warn};

use crate::book::Book;
use crate::util;

/// Fragment prefix marking a legacy positional anchor.
const FILEPOS_PREFIX: &str = "filepos";

/// Characters skipped past the anchor before scanning for an end boundary,
/// so the anchor's own tag is never mistaken for the next section.
const BOUNDARY_SCAN_SKIP: usize = 100;

/// Documents shorter than this are returned whole rather than split
/// heuristically.
const HEURISTIC_MIN_LEN: usize = 10_000;

/// An opening heading tag, levels 1-4.
static HEADING_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<h[1-4][^>]*>").unwrap());

/// A full heading element, levels 1-4.
static HEADING_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h[1-4][^>]*>.*?</h[1-4]>").unwrap());

/// Any injected positional marker.
static FILEPOS_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)id=["']?filepos\d+"#).unwrap());

/// A container whose class names it a chapter.
static CHAPTER_DIV: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<div[^>]*class=["'][^"']*chapter[^"']*["'][^>]*>"#).unwrap());

/// Split an href into its resource name and optional fragment.
pub fn split_href(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((name, fragment)) => (name, Some(fragment)),
        None => (href, None),
    }
}

/// Resolve a navigation href to the markup it denotes.
///
/// `next_href` is the following navigation entry's target, threaded through
/// so that a positional fragment can end exactly where the next one begins.
/// Returns `None` when the target document is missing or not decodable;
/// never returns an empty string for a non-empty document.
pub fn resolve(book: &Book, href: &str, next_href: Option<&str>) -> Option<String> {
    let (name, fragment) = split_href(href);

    let Some(resource) = book.document_by_href(name) else {
        debug!("no document resource for {name}");
        return None;
    };

    let Some(text) = util::decode_text(&resource.data) else {
        warn!("{name} is not decodable text, skipping");
        return None;
    };

    match fragment {
        None => Some(text.into_owned()),
        Some(fragment) if fragment.starts_with(FILEPOS_PREFIX) => {
            Some(slice_at_filepos(&text, fragment, name, next_href))
        }
        Some(fragment) => Some(slice_at_id(&text, fragment)),
    }
}

/// `(?i)(?:id|name)=["']?<anchor>["']?` — the marker a converter injects
/// for a positional fragment. Also matches plain `<a name=...>` anchors.
fn anchor_attr_pattern(anchor: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i)(?:id|name)=["']?{}["']?"#,
        regex::escape(anchor)
    ))
    .unwrap()
}

/// `(?i)<[^>]+id=["']?<anchor>["']?[^>]*>` — a whole tag carrying the id.
fn id_tag_pattern(anchor: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i)<[^>]+id=["']?{}["']?[^>]*>"#,
        regex::escape(anchor)
    ))
    .unwrap()
}

/// Slice a document at a positional (`filepos`) fragment.
fn slice_at_filepos(text: &str, anchor: &str, resource: &str, next_href: Option<&str>) -> String {
    let Some(m) = anchor_attr_pattern(anchor).find(text) else {
        debug!("positional anchor {anchor} not found in {resource}");
        return heuristic_slice(text);
    };
    let start = m.start();
    let mut end = text.len();

    // Precise boundary: the next navigation target, when it is a positional
    // fragment within the same document.
    if let Some(next_href) = next_href {
        let (next_name, next_fragment) = split_href(next_href);
        if next_name == resource
            && let Some(next_fragment) = next_fragment
            && next_fragment.starts_with(FILEPOS_PREFIX)
            && let Some(next_match) = anchor_attr_pattern(next_fragment).find(text)
        {
            end = next_match.start();
        }
    }

    // Approximate boundary: the earliest of a heading, another positional
    // marker, or a chapter container, past the anchor's own tag.
    if end == text.len() {
        let from = util::ceil_char_boundary(text, start + BOUNDARY_SCAN_SKIP);
        let tail = &text[from..];
        end = [&*HEADING_OPEN, &*FILEPOS_ID, &*CHAPTER_DIV]
            .iter()
            .filter_map(|re| re.find(tail).map(|m| from + m.start()))
            .min()
            .unwrap_or(text.len());
    }

    let slice = text[start..end].trim();
    if slice.is_empty() {
        text.to_string()
    } else {
        slice.to_string()
    }
}

/// Slice a document at an ordinary `id` fragment: from the carrying tag to
/// the next heading. A missing id yields the whole document rather than an
/// error or an empty chapter.
fn slice_at_id(text: &str, anchor: &str) -> String {
    let Some(m) = id_tag_pattern(anchor).find(text) else {
        debug!("id anchor {anchor} not found, keeping whole document");
        return text.to_string();
    };

    let end = HEADING_OPEN
        .find(&text[m.end()..])
        .map(|h| m.end() + h.start())
        .unwrap_or(text.len());

    let slice = text[m.start()..end].trim();
    if slice.is_empty() {
        text.to_string()
    } else {
        slice.to_string()
    }
}

/// Last-resort slice when no anchor matched at all: for a long document
/// with several headings, the span between the first two headings; otherwise
/// the whole document.
fn heuristic_slice(text: &str) -> String {
    if text.len() > HEURISTIC_MIN_LEN {
        let mut headings = HEADING_SPAN.find_iter(text);
        if let (Some(first), Some(second)) = (headings.next(), headings.next()) {
            let slice = text[first.start()..second.start()].trim();
            if !slice.is_empty() {
                return slice.to_string();
            }
        }
    }
    text.to_string()
}
