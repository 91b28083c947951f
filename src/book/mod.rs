use std::collections::HashMap;

/// In-memory representation of a loaded EPUB archive.
///
/// Holds the package metadata, the spine (linear reading order), the
/// navigation tree, and every resource from the manifest. Resources are
/// read-only once loaded; chapter extraction borrows them.
#[derive(Debug, Clone, Default)]
pub struct Book {
    pub metadata: Metadata,
    pub spine: Vec<SpineItem>,
    pub toc: Vec<TocEntry>,
    resources: Vec<Resource>,
    by_href: HashMap<String, usize>,
    by_id: HashMap<String, usize>,
}

/// Book metadata (Dublin Core subset)
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub title: String,
    pub authors: Vec<String>,
    pub language: String,
    pub identifier: String,
    pub publisher: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
}

/// An item in the reading order (spine)
#[derive(Debug, Clone)]
pub struct SpineItem {
    pub idref: String,
    /// `false` for auxiliary content (`linear="no"`), which is not part of
    /// the main reading sequence.
    pub linear: bool,
}

/// A table of contents entry (hierarchical)
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TocEntry {
    pub title: String,
    /// Target resource href, optionally with a `#fragment` suffix.
    pub href: String,
    pub children: Vec<TocEntry>,
    /// Play order from the NCX playOrder attribute, when present.
    pub play_order: Option<usize>,
}

/// Broad classification of a manifest resource, derived from its media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// A content document (XHTML/HTML)
    Document,
    /// An image
    Image,
    /// A stylesheet
    Stylesheet,
    /// Anything else (fonts, NCX, audio, ...)
    Other,
}

impl MediaKind {
    pub fn from_media_type(media_type: &str) -> Self {
        let media_type = media_type
            .split(';')
            .next()
            .unwrap_or(media_type)
            .trim()
            .to_ascii_lowercase();
        match media_type.as_str() {
            "application/xhtml+xml" | "text/html" => MediaKind::Document,
            "text/css" => MediaKind::Stylesheet,
            _ if media_type.starts_with("image/") => MediaKind::Image,
            _ => MediaKind::Other,
        }
    }
}

/// A resource from the archive manifest.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Manifest id, unique within the archive.
    pub id: String,
    /// Archive-relative path, unique within the archive.
    pub href: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

impl Resource {
    pub fn kind(&self) -> MediaKind {
        MediaKind::from_media_type(&self.media_type)
    }

    pub fn is_document(&self) -> bool {
        self.kind() == MediaKind::Document
    }
}

/// One extracted chapter: the output unit of this crate.
///
/// `content` is never empty for an emitted chapter, and `id` is unique
/// across the chapter list of a single book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    /// Extracted markup, ready for conversion.
    pub content: String,
    /// Provenance: a resource href, `href#fragment`, a spine idref, or a
    /// synthetic tag when the content was re-split.
    pub id: String,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource to the book
    pub fn add_resource(
        &mut self,
        id: impl Into<String>,
        href: impl Into<String>,
        data: Vec<u8>,
        media_type: impl Into<String>,
    ) {
        let resource = Resource {
            id: id.into(),
            href: href.into(),
            media_type: media_type.into(),
            data,
        };
        let index = self.resources.len();
        self.by_href.insert(resource.href.clone(), index);
        if !resource.id.is_empty() {
            self.by_id.insert(resource.id.clone(), index);
        }
        self.resources.push(resource);
    }

    /// All resources, in manifest order.
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Look up a resource by its archive-relative path.
    ///
    /// Falls back to a percent-decoded lookup, since navigation hrefs are
    /// sometimes URL-encoded while manifest hrefs are not (or vice versa).
    pub fn resource_by_href(&self, href: &str) -> Option<&Resource> {
        if let Some(&i) = self.by_href.get(href) {
            return Some(&self.resources[i]);
        }
        let decoded = percent_encoding::percent_decode_str(href)
            .decode_utf8()
            .ok()?;
        self.by_href.get(decoded.as_ref()).map(|&i| &self.resources[i])
    }

    /// Look up a resource by its manifest id.
    pub fn resource_by_id(&self, id: &str) -> Option<&Resource> {
        self.by_id.get(id).map(|&i| &self.resources[i])
    }

    /// Look up a content document by href; non-document resources are ignored.
    pub fn document_by_href(&self, href: &str) -> Option<&Resource> {
        self.resource_by_href(href).filter(|r| r.is_document())
    }

    /// All content documents.
    pub fn documents(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|r| r.is_document())
    }

    /// All image resources, exported as-is by the export stage.
    pub fn images(&self) -> impl Iterator<Item = &Resource> {
        self.resources
            .iter()
            .filter(|r| r.kind() == MediaKind::Image)
    }
}

impl TocEntry {
    pub fn new(title: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            href: href.into(),
            children: Vec::new(),
            play_order: None,
        }
    }

    pub fn with_child(mut self, child: TocEntry) -> Self {
        self.children.push(child);
        self
    }
}
