//! Text utilities shared by the extraction and export stages.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

/// Any HTML/XML tag, including its attributes.
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

/// A run of blank lines (possibly containing stray whitespace).
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Decode document bytes to text, handling various encodings.
///
/// This function:
/// 1. Rejects content containing NUL bytes (binary data mislabeled as a document)
/// 2. Tries UTF-8 (handles BOM automatically via encoding_rs)
/// 3. If malformed, tries the encoding from `<?xml encoding="..."?>`
/// 4. Falls back to Windows-1252 (common in old ebooks)
///
/// Returns `None` only for content that is not text at all.
pub fn decode_text(bytes: &[u8]) -> Option<Cow<'_, str>> {
    if bytes.contains(&0) {
        return None;
    }

    // Try UTF-8 first (handles BOM automatically)
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return Some(result);
    }

    // If UTF-8 failed, try the encoding declared in the XML prolog
    if let Some(name) = extract_xml_encoding(bytes)
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return Some(result);
    }

    // Fallback: Windows-1252 (superset of ISO-8859-1)
    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    Some(result)
}

/// Extract encoding from an XML declaration.
///
/// Parses `<?xml ... encoding="..." ?>` to extract the encoding name.
/// Only the first ~100 bytes are checked.
pub fn extract_xml_encoding(bytes: &[u8]) -> Option<&str> {
    let check_len = bytes.len().min(100);
    let prefix = &bytes[..check_len];

    let xml_start = prefix.windows(5).position(|w| w == b"<?xml")?;
    let after_xml = &prefix[xml_start..];

    let enc_pos = after_xml
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    let after_enc = &after_xml[enc_pos + 9..];

    if after_enc.is_empty() {
        return None;
    }

    let quote = after_enc[0];
    if quote != b'"' && quote != b'\'' {
        return None;
    }

    let value_start = 1;
    let value_end = after_enc[value_start..].iter().position(|&b| b == quote)? + value_start;

    std::str::from_utf8(&after_enc[value_start..value_end]).ok()
}

/// Remove all markup tags, keeping only the text between them.
pub fn strip_tags(html: &str) -> String {
    TAG.replace_all(html, "").into_owned()
}

/// Replace every markup tag with a newline, so block boundaries survive
/// as line breaks in the stripped text.
pub fn tags_to_newlines(html: &str) -> String {
    TAG.replace_all(html, "\n").into_owned()
}

/// Decode HTML entities (`&amp;`, `&#8217;`, ...) to their characters.
pub fn decode_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

/// Collapse runs of blank lines so paragraphs are separated by exactly
/// one empty line.
pub fn collapse_blank_lines(text: &str) -> String {
    BLANK_RUN.replace_all(text, "\n\n").into_owned()
}

/// Round `index` up to the nearest UTF-8 character boundary in `s`.
pub fn ceil_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i += 1;
    }
    i
}
