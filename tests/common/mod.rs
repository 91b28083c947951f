//! In-memory EPUB fixtures for integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use chapterize::{Book, read_epub_from_reader};

/// A navigation entry, possibly nested.
#[derive(Debug, Clone)]
pub struct Nav {
    pub title: String,
    pub href: String,
    pub children: Vec<Nav>,
}

pub fn nav(title: &str, href: &str) -> Nav {
    Nav {
        title: title.to_string(),
        href: href.to_string(),
        children: Vec::new(),
    }
}

impl Nav {
    pub fn child(mut self, child: Nav) -> Self {
        self.children.push(child);
        self
    }
}

/// Builds a minimal but valid EPUB in memory.
#[derive(Default)]
pub struct EpubFixture {
    docs: Vec<(String, String, String)>,
    images: Vec<(String, Vec<u8>)>,
    nav: Vec<Nav>,
    spine: Option<Vec<(String, bool)>>,
    epub3_nav: bool,
}

impl EpubFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a content document as (manifest id, archive name, content).
    pub fn doc(mut self, id: &str, name: &str, content: &str) -> Self {
        self.docs
            .push((id.to_string(), name.to_string(), content.to_string()));
        self
    }

    pub fn image(mut self, name: &str, data: &[u8]) -> Self {
        self.images.push((name.to_string(), data.to_vec()));
        self
    }

    pub fn nav(mut self, entry: Nav) -> Self {
        self.nav.push(entry);
        self
    }

    /// Override the spine; by default every document is a linear spine item.
    pub fn spine(mut self, items: &[(&str, bool)]) -> Self {
        self.spine = Some(
            items
                .iter()
                .map(|(id, linear)| (id.to_string(), *linear))
                .collect(),
        );
        self
    }

    /// Emit an EPUB 3 nav document instead of an NCX.
    pub fn with_epub3_nav(mut self) -> Self {
        self.epub3_nav = true;
        self
    }

    pub fn build(&self) -> Book {
        read_epub_from_reader(Cursor::new(self.to_bytes())).expect("failed to read fixture EPUB")
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        zip.start_file("mimetype", stored).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();

        zip.start_file("META-INF/container.xml", deflated).unwrap();
        zip.write_all(CONTAINER_XML.as_bytes()).unwrap();

        zip.start_file("OEBPS/content.opf", deflated).unwrap();
        zip.write_all(self.opf().as_bytes()).unwrap();

        if self.has_ncx() {
            zip.start_file("OEBPS/toc.ncx", deflated).unwrap();
            zip.write_all(self.ncx().as_bytes()).unwrap();
        }
        if self.has_nav_doc() {
            zip.start_file("OEBPS/nav.xhtml", deflated).unwrap();
            zip.write_all(self.nav_doc().as_bytes()).unwrap();
        }

        for (_, name, content) in &self.docs {
            zip.start_file(format!("OEBPS/{name}"), deflated).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        for (name, data) in &self.images {
            zip.start_file(format!("OEBPS/{name}"), deflated).unwrap();
            zip.write_all(data).unwrap();
        }

        zip.finish().unwrap().into_inner()
    }

    fn has_ncx(&self) -> bool {
        !self.nav.is_empty() && !self.epub3_nav
    }

    fn has_nav_doc(&self) -> bool {
        !self.nav.is_empty() && self.epub3_nav
    }

    fn opf(&self) -> String {
        let mut opf = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Fixture Book</dc:title>
    <dc:identifier id="BookId">fixture-0001</dc:identifier>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
"#,
        );

        for (id, name, _) in &self.docs {
            opf.push_str(&format!(
                "    <item id=\"{id}\" href=\"{name}\" media-type=\"application/xhtml+xml\"/>\n"
            ));
        }
        for (i, (name, _)) in self.images.iter().enumerate() {
            opf.push_str(&format!(
                "    <item id=\"img{i}\" href=\"{name}\" media-type=\"{}\"/>\n",
                image_media_type(name)
            ));
        }
        if self.has_ncx() {
            opf.push_str(
                "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
            );
        }
        if self.has_nav_doc() {
            opf.push_str(
                "    <item id=\"nav\" href=\"nav.xhtml\" properties=\"nav\" media-type=\"application/xhtml+xml\"/>\n",
            );
        }
        opf.push_str("  </manifest>\n");

        if self.has_ncx() {
            opf.push_str("  <spine toc=\"ncx\">\n");
        } else {
            opf.push_str("  <spine>\n");
        }
        match &self.spine {
            Some(items) => {
                for (id, linear) in items {
                    if *linear {
                        opf.push_str(&format!("    <itemref idref=\"{id}\"/>\n"));
                    } else {
                        opf.push_str(&format!(
                            "    <itemref idref=\"{id}\" linear=\"no\"/>\n"
                        ));
                    }
                }
            }
            None => {
                for (id, _, _) in &self.docs {
                    opf.push_str(&format!("    <itemref idref=\"{id}\"/>\n"));
                }
            }
        }
        opf.push_str("  </spine>\n</package>\n");
        opf
    }

    fn ncx(&self) -> String {
        let mut ncx = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>
"#,
        );
        let mut play_order = 0;
        write_nav_points(&self.nav, &mut ncx, &mut play_order);
        ncx.push_str("  </navMap>\n</ncx>\n");
        ncx
    }

    fn nav_doc(&self) -> String {
        let mut doc = String::from(
            r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>Contents</title></head>
<body>
<nav epub:type="toc">
"#,
        );
        write_nav_list(&self.nav, &mut doc);
        doc.push_str("</nav>\n</body>\n</html>\n");
        doc
    }
}

fn write_nav_points(entries: &[Nav], out: &mut String, play_order: &mut usize) {
    for entry in entries {
        *play_order += 1;
        out.push_str(&format!(
            "<navPoint id=\"np{0}\" playOrder=\"{0}\">",
            play_order
        ));
        out.push_str(&format!(
            "<navLabel><text>{}</text></navLabel>",
            escape_xml(&entry.title)
        ));
        out.push_str(&format!("<content src=\"{}\"/>", escape_xml(&entry.href)));
        write_nav_points(&entry.children, out, play_order);
        out.push_str("</navPoint>\n");
    }
}

fn write_nav_list(entries: &[Nav], out: &mut String) {
    if entries.is_empty() {
        return;
    }
    out.push_str("<ol>\n");
    for entry in entries {
        out.push_str(&format!(
            "<li><a href=\"{}\">{}</a>",
            escape_xml(&entry.href),
            escape_xml(&entry.title)
        ));
        write_nav_list(&entry.children, out);
        out.push_str("</li>\n");
    }
    out.push_str("</ol>\n");
}

fn image_media_type(name: &str) -> &'static str {
    if name.ends_with(".png") {
        "image/png"
    } else if name.ends_with(".gif") {
        "image/gif"
    } else {
        "image/jpeg"
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;
