//! Recovery for archives whose navigation produced identical chapters.
//!
//! Some EPUBs carry a full table of contents whose anchors all resolve to
//! the same bytes, so every assembled chapter is a copy of the whole book.
//! When that happens the shared content is re-split: first on HTML heading
//! elements, then on textual heading patterns, and as a last resort emitted
//! as a single chapter.

use once_cell::sync::Lazy;
use regex::Regex;

use log::warn;

use crate::book::Chapter;
use crate::util;

/// A full heading element, levels 1-3, with its inner markup captured.
static HEADING_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h[1-3][^>]*>(.*?)</h[1-3]>").unwrap());

/// A run of newlines.
static NEWLINE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n+").unwrap());

/// Textual heading forms, tried in order against each line.
static LINE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Markdown-style heading
        Regex::new(r"^#+\s+(.+)$").unwrap(),
        // "Chapter 12: Title"
        Regex::new(r"(?i)^Chapter\s+\d+[:.\s]*(.*)$").unwrap(),
        // "3. Title"
        Regex::new(r"^\d+\.\s*(.+)$").unwrap(),
        // CJK ordinal chapter heading
        Regex::new(r"^第[0-9零一二三四五六七八九十百千万两〇]+[章节回卷部篇][：:\s]*(.*)$")
            .unwrap(),
    ]
});

/// Detect the all-chapters-identical failure mode and re-split when it fires.
///
/// Any other chapter list passes through untouched.
pub fn postprocess(chapters: Vec<Chapter>) -> Vec<Chapter> {
    if chapters.len() < 2 {
        return chapters;
    }
    let first = &chapters[0].content;
    if !chapters[1..].iter().all(|c| c.content == *first) {
        return chapters;
    }

    warn!(
        "all {} chapters resolved to identical content; re-splitting by headings",
        chapters.len()
    );
    split_content(first)
}

/// Split a combined document into chapters, trying each strategy in order.
pub fn split_content(content: &str) -> Vec<Chapter> {
    if let Some(chapters) = split_by_headings(content) {
        return chapters;
    }
    if let Some(chapters) = split_by_line_patterns(content) {
        return chapters;
    }

    warn!("automatic chapter splitting failed, exporting as a single chapter");
    vec![Chapter {
        title: "Complete Content".to_string(),
        content: content.to_string(),
        id: "full_content".to_string(),
    }]
}

/// Split on HTML heading elements (levels 1-3). Each chapter spans from one
/// heading to the start of the next; the last runs to the end.
fn split_by_headings(content: &str) -> Option<Vec<Chapter>> {
    let headings: Vec<(usize, String)> = HEADING_SPAN
        .captures_iter(content)
        .map(|caps| {
            let whole = caps.get(0).unwrap();
            (whole.start(), caps[1].to_string())
        })
        .collect();

    if headings.len() < 2 {
        return None;
    }

    let mut chapters = Vec::new();
    for (i, (start, title_markup)) in headings.iter().enumerate() {
        let end = headings
            .get(i + 1)
            .map(|(next_start, _)| *next_start)
            .unwrap_or(content.len());

        let chapter_content = content[*start..end].trim();
        if chapter_content.is_empty() {
            continue;
        }

        let title = util::decode_entities(util::strip_tags(title_markup).trim());
        let title = if title.trim().is_empty() {
            format!("Chapter {}", i + 1)
        } else {
            title.trim().to_string()
        };

        chapters.push(Chapter {
            title,
            content: chapter_content.to_string(),
            id: format!("chapter_{}", i + 1),
        });
    }

    (chapters.len() > 1).then_some(chapters)
}

/// Split on textual heading patterns after stripping all markup.
fn split_by_line_patterns(content: &str) -> Option<Vec<Chapter>> {
    let text = util::tags_to_newlines(content);
    let text = NEWLINE_RUN.replace_all(&text, "\n");

    let mut chapters: Vec<Chapter> = Vec::new();
    let mut current_lines: Vec<&str> = Vec::new();
    let mut current_title: Option<String> = None;

    let flush = |lines: &mut Vec<&str>, title: &mut Option<String>, chapters: &mut Vec<Chapter>| {
        let body = lines.join("\n");
        let body = body.trim();
        if !body.is_empty() {
            let n = chapters.len() + 1;
            chapters.push(Chapter {
                title: title.take().unwrap_or_else(|| format!("Chapter {n}")),
                content: body.to_string(),
                id: format!("chapter_{n}"),
            });
        }
        lines.clear();
    };

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let matched_title = LINE_PATTERNS.iter().find_map(|pattern| {
            pattern.captures(line).map(|caps| {
                caps.get(1)
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|t| !t.is_empty())
            })
        });

        match matched_title {
            // A heading line starts a new chapter
            Some(title) => {
                flush(&mut current_lines, &mut current_title, &mut chapters);
                current_lines.push(line);
                current_title = title;
            }
            None => current_lines.push(line),
        }
    }
    flush(&mut current_lines, &mut current_title, &mut chapters);

    (chapters.len() > 1).then_some(chapters)
}
