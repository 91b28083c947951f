//! Error types for chapterize operations.

use thiserror::Error;

/// Errors that can occur while loading an archive or exporting chapters.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid EPUB: {0}")]
    InvalidEpub(String),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("no chapters could be extracted")]
    NoChapters,

    #[error("conversion failed: {0}")]
    Conversion(String),
}

pub type Result<T> = std::result::Result<T, Error>;
