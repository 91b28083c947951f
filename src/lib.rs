//! # chapterize
//!
//! A library and CLI for splitting EPUB ebooks into per-chapter Markdown or
//! plain text files.
//!
//! ## Features
//!
//! - Reads EPUB 2/3 archives (NCX and EPUB 3 nav document)
//! - Resolves sub-document anchors, including legacy `filepos` markers
//! - Recovers from navigation metadata that fails to differentiate chapters
//! - Exports images path-preserving and rewrites links in Markdown output
//!
//! ## Quick Start
//!
//! ```no_run
//! use chapterize::{read_epub, chapters};
//!
//! let book = read_epub("input.epub")?;
//! for chapter in chapters(&book) {
//!     println!("{}: {} bytes", chapter.title, chapter.content.len());
//! }
//! # Ok::<(), chapterize::Error>(())
//! ```
//!
//! ## Exporting to disk
//!
//! ```no_run
//! use std::path::Path;
//! use chapterize::{read_epub, export_book, OutputFormat, PandocConverter};
//!
//! let book = read_epub("input.epub")?;
//! let report = export_book(&book, Path::new("out"), OutputFormat::Markdown, &PandocConverter::new())?;
//! println!("{} chapters, {} images", report.chapters, report.images);
//! # Ok::<(), chapterize::Error>(())
//! ```

pub mod book;
pub mod epub;
pub mod error;
pub mod export;
pub mod extract;
pub(crate) mod util;

pub use book::{Book, Chapter, MediaKind, Metadata, Resource, SpineItem, TocEntry};
pub use epub::{read_epub, read_epub_from_reader};
pub use error::{Error, Result};
pub use export::{
    ExportReport, HtmlConverter, OutputFormat, PandocConverter, export_book, plain_text,
};
pub use extract::chapters;
