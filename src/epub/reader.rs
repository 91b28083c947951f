use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::Path;
use zip::ZipArchive;

use log::{debug, warn};

use crate::book::{Book, Metadata, SpineItem, TocEntry};
use crate::error::{Error, Result};

/// Parsed OPF content
struct OpfData {
    metadata: Metadata,
    /// Maps manifest id -> (href, media_type)
    manifest: Vec<(String, String, String)>,
    /// Spine itemrefs as (idref, linear)
    spine: Vec<(String, bool)>,
    ncx_href: Option<String>,
    nav_href: Option<String>,
}

/// Read an EPUB file from disk into a [`Book`].
///
/// Supports EPUB 2 and EPUB 3 formats. Extracts metadata, the spine, the
/// navigation tree (NCX, falling back to the EPUB 3 nav document), and all
/// manifest resources.
///
/// # Example
///
/// ```no_run
/// use chapterize::read_epub;
///
/// let book = read_epub("path/to/book.epub")?;
/// println!("Title: {}", book.metadata.title);
/// # Ok::<(), chapterize::Error>(())
/// ```
pub fn read_epub<P: AsRef<Path>>(path: P) -> Result<Book> {
    let file = std::fs::File::open(path)?;
    read_epub_from_reader(file)
}

/// Read an EPUB from any [`Read`] + [`Seek`] source.
///
/// Useful for reading from memory buffers.
pub fn read_epub_from_reader<R: Read + Seek>(reader: R) -> Result<Book> {
    let mut archive = ZipArchive::new(reader)?;

    // 1. Find the OPF file path from container.xml
    let opf_path = find_opf_path(&mut archive)?;
    let opf_dir = Path::new(&opf_path)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();

    // 2. Parse the OPF file
    let opf_content = read_archive_file(&mut archive, &opf_path)?;
    let OpfData {
        metadata,
        manifest,
        spine,
        ncx_href,
        nav_href,
    } = parse_opf(&opf_content)?;

    // 3. Build the Book structure
    let mut book = Book::new();
    book.metadata = metadata;

    // 4. Load all resources from the manifest
    for (id, href, media_type) in manifest {
        let full_path = resolve_path(&opf_dir, &href);
        match read_archive_file_bytes(&mut archive, &full_path) {
            Ok(data) => book.add_resource(id, href, data, media_type),
            Err(e) => debug!("manifest item {href} could not be read: {e}"),
        }
    }

    // 5. Spine (linear reading order); items missing from the manifest are
    // kept and reported later, when the spine is actually walked
    for (idref, linear) in spine {
        book.spine.push(SpineItem { idref, linear });
    }

    // 6. Navigation tree: NCX first, then the EPUB 3 nav document
    if let Some(ncx_href) = ncx_href {
        let ncx_path = resolve_path(&opf_dir, &ncx_href);
        if let Ok(ncx_content) = read_archive_file(&mut archive, &ncx_path) {
            book.toc = parse_ncx(&ncx_content)?;
        }
    }
    if book.toc.is_empty()
        && let Some(nav_href) = nav_href
    {
        let nav_path = resolve_path(&opf_dir, &nav_href);
        if let Ok(nav_content) = read_archive_file(&mut archive, &nav_path) {
            book.toc = parse_nav(&nav_content)?;
        }
    }
    if book.toc.is_empty() {
        warn!("archive carries no usable table of contents");
    }

    Ok(book)
}

fn find_opf_path<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String> {
    let container = read_archive_file(archive, "META-INF/container.xml")?;

    let mut reader = Reader::from_str(&container);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.name().as_ref() == b"rootfile" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"full-path" {
                        return Ok(String::from_utf8(attr.value.to_vec())?);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    Err(Error::InvalidEpub(
        "No rootfile found in container.xml".into(),
    ))
}

fn parse_opf(content: &str) -> Result<OpfData> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut metadata = Metadata::default();
    let mut manifest: Vec<(String, String, String)> = Vec::new();
    let mut spine: Vec<(String, bool)> = Vec::new();
    let mut nav_href: Option<String> = None;
    let mut toc_id: Option<String> = None;

    let mut in_metadata = false;
    let mut current_element: Option<String> = None;
    let mut buf_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                match local {
                    b"metadata" => in_metadata = true,
                    b"title" | b"creator" | b"language" | b"identifier" | b"publisher"
                    | b"description" | b"date" => {
                        if in_metadata {
                            current_element = Some(String::from_utf8_lossy(local).to_string());
                            buf_text.clear();
                        }
                    }
                    b"spine" => {
                        // The toc attribute references the NCX manifest item
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"toc" {
                                toc_id = Some(String::from_utf8(attr.value.to_vec())?);
                            }
                        }
                    }
                    b"item" => parse_manifest_item(&e, &mut manifest, &mut nav_href)?,
                    b"itemref" => parse_spine_itemref(&e, &mut spine)?,
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                match local {
                    b"item" => parse_manifest_item(&e, &mut manifest, &mut nav_href)?,
                    b"itemref" => parse_spine_itemref(&e, &mut spine)?,
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if current_element.is_some() {
                    let raw = String::from_utf8_lossy(e.as_ref());
                    buf_text.push_str(&raw);
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if current_element.is_some() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    buf_text.push_str(resolve_entity(&entity));
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                if local == b"metadata" {
                    in_metadata = false;
                }

                if let Some(ref elem) = current_element {
                    match elem.as_str() {
                        "title" => metadata.title = buf_text.clone(),
                        "creator" => metadata.authors.push(buf_text.clone()),
                        "language" => metadata.language = buf_text.clone(),
                        "identifier" => {
                            if metadata.identifier.is_empty() {
                                metadata.identifier = buf_text.clone();
                            }
                        }
                        "publisher" => metadata.publisher = Some(buf_text.clone()),
                        "description" => metadata.description = Some(buf_text.clone()),
                        "date" => metadata.date = Some(buf_text.clone()),
                        _ => {}
                    }
                    current_element = None;
                    buf_text.clear();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    // Resolve the NCX href from the spine's toc attribute
    let ncx_href = toc_id.and_then(|toc_id| {
        manifest
            .iter()
            .find(|(id, _, _)| *id == toc_id)
            .map(|(_, href, _)| href.clone())
    });

    Ok(OpfData {
        metadata,
        manifest,
        spine,
        ncx_href,
        nav_href,
    })
}

fn parse_manifest_item(
    e: &quick_xml::events::BytesStart<'_>,
    manifest: &mut Vec<(String, String, String)>,
    nav_href: &mut Option<String>,
) -> Result<()> {
    let mut id = String::new();
    let mut href = String::new();
    let mut media_type = String::new();
    let mut properties: Option<String> = None;

    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"id" => id = String::from_utf8(attr.value.to_vec())?,
            b"href" => href = String::from_utf8(attr.value.to_vec())?,
            b"media-type" => media_type = String::from_utf8(attr.value.to_vec())?,
            b"properties" => properties = Some(String::from_utf8(attr.value.to_vec())?),
            _ => {}
        }
    }

    // EPUB 3: <item properties="nav" .../> marks the navigation document
    if properties
        .as_ref()
        .is_some_and(|props| props.split_ascii_whitespace().any(|p| p == "nav"))
    {
        *nav_href = Some(href.clone());
    }

    if !id.is_empty() {
        manifest.push((id, href, media_type));
    }
    Ok(())
}

fn parse_spine_itemref(
    e: &quick_xml::events::BytesStart<'_>,
    spine: &mut Vec<(String, bool)>,
) -> Result<()> {
    let mut idref = String::new();
    let mut linear = true;

    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"idref" => idref = String::from_utf8(attr.value.to_vec())?,
            b"linear" => linear = attr.value.as_ref() != b"no",
            _ => {}
        }
    }

    if !idref.is_empty() {
        spine.push((idref, linear));
    }
    Ok(())
}

fn parse_ncx(content: &str) -> Result<Vec<TocEntry>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    // One frame per open navPoint; the bottom frame collects the roots.
    struct PendingPoint {
        children: Vec<TocEntry>,
        text: Option<String>,
        src: Option<String>,
        play_order: Option<usize>,
    }

    let mut stack: Vec<PendingPoint> = vec![PendingPoint {
        children: Vec::new(),
        text: None,
        src: None,
        play_order: None,
    }];
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"navPoint" => {
                        let mut play_order = None;
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"playOrder"
                                && let Ok(order_str) = String::from_utf8(attr.value.to_vec())
                            {
                                play_order = order_str.parse().ok();
                            }
                        }
                        stack.push(PendingPoint {
                            children: Vec::new(),
                            text: None,
                            src: None,
                            play_order,
                        });
                    }
                    b"text" => in_text = true,
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                let name = e.name();
                if local_name(name.as_ref()) == b"content" {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"src"
                            && let Some(point) = stack.last_mut()
                        {
                            point.src = Some(String::from_utf8(attr.value.to_vec())?);
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if in_text && let Some(point) = stack.last_mut() {
                    let raw = String::from_utf8_lossy(e.as_ref());
                    match &mut point.text {
                        Some(existing) => existing.push_str(&raw),
                        None => point.text = Some(raw.into_owned()),
                    }
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_text && let Some(point) = stack.last_mut() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    let resolved = resolve_entity(&entity);
                    match &mut point.text {
                        Some(existing) => existing.push_str(resolved),
                        None => point.text = Some(resolved.to_string()),
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"text" => in_text = false,
                    b"navPoint" => {
                        if let Some(point) = stack.pop()
                            && let (Some(text), Some(src)) = (point.text, point.src)
                        {
                            let mut entry = TocEntry::new(text, src);
                            entry.children = point.children;
                            entry.play_order = point.play_order;

                            if let Some(parent) = stack.last_mut() {
                                parent.children.push(entry);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    Ok(stack.pop().map(|p| p.children).unwrap_or_default())
}

/// Parse the EPUB 3 navigation document (`<nav epub:type="toc">`).
///
/// Reads the nested `ol`/`li`/`a` structure into [`TocEntry`] nodes.
/// Unlinked list items (heading-only `li` without an `a href`) are dropped,
/// but their children are spliced into the parent level in order.
fn parse_nav(content: &str) -> Result<Vec<TocEntry>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    #[derive(Default)]
    struct PendingItem {
        title: String,
        href: Option<String>,
        children: Vec<TocEntry>,
    }

    let mut root: Vec<TocEntry> = Vec::new();
    let mut stack: Vec<PendingItem> = Vec::new();
    let mut in_toc_nav = false;
    let mut toc_done = false;
    let mut in_anchor = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"nav" if !in_toc_nav && !toc_done => {
                        let mut nav_type: Option<String> = None;
                        for attr in e.attributes().flatten() {
                            if local_name(attr.key.as_ref()) == b"type" {
                                nav_type = Some(String::from_utf8(attr.value.to_vec())?);
                            }
                        }
                        match nav_type.as_deref() {
                            // An unmarked nav is accepted as the toc
                            Some("toc") | None => in_toc_nav = true,
                            Some(_) => {
                                // landmarks, page-list, ... skip wholesale
                                let end = e.to_end().into_owned();
                                reader.read_to_end(end.name())?;
                            }
                        }
                    }
                    b"li" if in_toc_nav => stack.push(PendingItem::default()),
                    b"a" if in_toc_nav => {
                        in_anchor = true;
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"href"
                                && let Some(item) = stack.last_mut()
                            {
                                item.href = Some(String::from_utf8(attr.value.to_vec())?);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if in_anchor && let Some(item) = stack.last_mut() {
                    let raw = String::from_utf8_lossy(e.as_ref());
                    item.title.push_str(&raw);
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_anchor && let Some(item) = stack.last_mut() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    item.title.push_str(resolve_entity(&entity));
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"a" => in_anchor = false,
                    b"li" if in_toc_nav => {
                        if let Some(item) = stack.pop() {
                            let siblings = match stack.last_mut() {
                                Some(parent) => &mut parent.children,
                                None => &mut root,
                            };
                            match item.href {
                                Some(href) => {
                                    let mut entry = TocEntry::new(item.title.trim(), href);
                                    entry.children = item.children;
                                    siblings.push(entry);
                                }
                                None => siblings.extend(item.children),
                            }
                        }
                    }
                    b"nav" if in_toc_nav => {
                        in_toc_nav = false;
                        toc_done = true;
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    Ok(root)
}

fn read_archive_file<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String> {
    let bytes = read_archive_file_bytes(archive, path)?;
    // Strip UTF-8 BOM if present
    let bytes = strip_bom(&bytes);
    Ok(String::from_utf8(bytes.to_vec())?)
}

fn read_archive_file_bytes<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<Vec<u8>> {
    // Try direct lookup first
    match archive.by_name(path) {
        Ok(mut file) => {
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            return Ok(contents);
        }
        Err(zip::result::ZipError::FileNotFound) => {}
        Err(e) => return Err(e.into()),
    }

    // Fallback: try percent-decoded path (handles malformed EPUBs)
    let decoded = percent_encoding::percent_decode_str(path)
        .decode_utf8()
        .map_err(|_| Error::InvalidEpub(format!("Invalid UTF-8 in path: {}", path)))?;

    let mut file = archive.by_name(&decoded)?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    Ok(contents)
}

/// Strip UTF-8 BOM (byte order mark) if present
fn strip_bom(data: &[u8]) -> &[u8] {
    // UTF-8 BOM: EF BB BF
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    }
}

fn resolve_path(base: &str, href: &str) -> String {
    if base.is_empty() {
        href.to_string()
    } else {
        format!("{}/{}", base, href)
    }
}

/// Resolve the named XML entities that occur in package documents.
fn resolve_entity(entity: &str) -> &'static str {
    match entity {
        "apos" => "'",
        "quot" => "\"",
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "nbsp" => "\u{a0}",
        _ => "",
    }
}

/// Extract local name from potentially namespaced XML name
fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_name() {
        assert_eq!(local_name(b"dc:title"), b"title");
        assert_eq!(local_name(b"title"), b"title");
        assert_eq!(local_name(b"epub:type"), b"type");
    }

    #[test]
    fn test_parse_opf_spine_linear() {
        let opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Don&apos;t Panic</dc:title>
    <dc:creator>A. Author</dc:creator>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="notes" href="notes.xhtml" media-type="application/xhtml+xml"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="ch1"/>
    <itemref idref="notes" linear="no"/>
  </spine>
</package>"#;

        let opf = parse_opf(opf).unwrap();
        assert_eq!(opf.metadata.title, "Don't Panic");
        assert_eq!(opf.metadata.authors, vec!["A. Author"]);
        assert_eq!(
            opf.spine,
            vec![("ch1".to_string(), true), ("notes".to_string(), false)]
        );
        assert_eq!(opf.ncx_href.as_deref(), Some("toc.ncx"));
        assert_eq!(opf.nav_href, None);
        assert_eq!(opf.manifest.len(), 3);
    }

    #[test]
    fn test_parse_opf_detects_nav_document() {
        let opf = r#"<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata/>
  <manifest>
    <item id="nav" href="nav.xhtml" properties="nav" media-type="application/xhtml+xml"/>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine><itemref idref="ch1"/></spine>
</package>"#;

        let opf = parse_opf(opf).unwrap();
        assert_eq!(opf.nav_href.as_deref(), Some("nav.xhtml"));
        assert_eq!(opf.ncx_href, None);
    }

    #[test]
    fn test_parse_ncx_nested() {
        let ncx = r#"<?xml version="1.0"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>
    <navPoint id="p1" playOrder="1">
      <navLabel><text>Part One</text></navLabel>
      <content src="part1.xhtml"/>
      <navPoint id="p2" playOrder="2">
        <navLabel><text>Don&apos;t Panic</text></navLabel>
        <content src="part1.xhtml#ch1"/>
      </navPoint>
    </navPoint>
    <navPoint id="p3" playOrder="3">
      <navLabel><text>Part Two</text></navLabel>
      <content src="part2.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;

        let toc = parse_ncx(ncx).unwrap();
        assert_eq!(toc.len(), 2);
        assert_eq!(toc[0].title, "Part One");
        assert_eq!(toc[0].children.len(), 1);
        assert_eq!(toc[0].children[0].title, "Don't Panic");
        assert_eq!(toc[0].children[0].href, "part1.xhtml#ch1");
        assert_eq!(toc[1].play_order, Some(3));
    }

    #[test]
    fn test_parse_nav_document() {
        let nav = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<body>
<nav epub:type="landmarks"><ol><li><a href="cover.xhtml">Cover</a></li></ol></nav>
<nav epub:type="toc">
  <h1>Contents</h1>
  <ol>
    <li><a href="ch1.xhtml">Chapter One</a>
      <ol>
        <li><a href="ch1.xhtml#s1">Section 1.1</a></li>
      </ol>
    </li>
    <li><span>Unlinked group</span>
      <ol>
        <li><a href="ch2.xhtml">Chapter Two</a></li>
      </ol>
    </li>
  </ol>
</nav>
</body>
</html>"#;

        let toc = parse_nav(nav).unwrap();
        assert_eq!(toc.len(), 2);
        assert_eq!(toc[0].title, "Chapter One");
        assert_eq!(toc[0].children.len(), 1);
        assert_eq!(toc[0].children[0].href, "ch1.xhtml#s1");
        // The unlinked group is dropped, its child promoted
        assert_eq!(toc[1].title, "Chapter Two");
    }
}
