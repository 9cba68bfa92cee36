//! EPUB parser
//!
//! Reads the OCF container straight from the ZIP archive. `container.xml`
//! locates the package document, the package supplies metadata, manifest
//! and spine, and the EPUB 3 navigation document (or the EPUB 2 NCX)
//! supplies chapter titles.

use std::fmt::Display;
use std::io::{Cursor, Read, Seek};

use parking_lot::Mutex;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;
use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

use super::path;
use super::types::{
    BookMetadata, ChapterContent, ManifestItem, ParsedBook, Resource, SpineItem, TocEntry,
};

const CONTAINER_PATH: &str = "META-INF/container.xml";
const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// Largest inflated archive entry read when no limit is given
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to open EPUB: {0}")]
    OpenError(String),
    #[error("Missing archive entry: {0}")]
    MissingEntry(String),
    #[error("Malformed XML in {path}: {reason}")]
    XmlError { path: String, reason: String },
    #[error("Failed to read content: {0}")]
    ContentError(String),
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),
    #[error("Archive entry {name} inflates to {size} bytes (max: {max})")]
    EntryTooLarge { name: String, size: u64, max: u64 },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// `META-INF/container.xml`
#[derive(Debug, Deserialize)]
struct Container {
    rootfiles: RootFiles,
}

#[derive(Debug, Deserialize)]
struct RootFiles {
    #[serde(default)]
    rootfile: Vec<RootFile>,
}

#[derive(Debug, Deserialize)]
struct RootFile {
    #[serde(rename = "@full-path")]
    full_path: String,
    #[serde(rename = "@media-type", default)]
    media_type: Option<String>,
}

/// EPUB parser holding the open archive
pub struct EpubParser {
    archive: Mutex<ZipArchive<Cursor<Vec<u8>>>>,
    book: ParsedBook,
    /// Cap on the inflated size of any single entry
    max_entry_bytes: u64,
}

impl EpubParser {
    /// Open and parse an EPUB held in memory
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, ParseError> {
        Self::with_entry_limit(data, DEFAULT_MAX_ENTRY_BYTES)
    }

    /// Like [`EpubParser::from_bytes`], refusing any entry that inflates
    /// past `max_entry_bytes`
    pub fn with_entry_limit(data: Vec<u8>, max_entry_bytes: u64) -> Result<Self, ParseError> {
        let mut archive =
            ZipArchive::new(Cursor::new(data)).map_err(|e| ParseError::OpenError(e.to_string()))?;

        let container = read_string(&mut archive, CONTAINER_PATH, max_entry_bytes)?;
        let package_path = package_path(&container)?;
        let package_xml = read_string(&mut archive, &package_path, max_entry_bytes)?;
        let package = parse_package(&package_path, &package_xml)?;

        let spine = package.resolve_spine();
        let toc = match load_toc(&mut archive, &package, max_entry_bytes) {
            Ok(toc) => toc,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable table of contents");
                Vec::new()
            }
        };

        let book = ParsedBook {
            package_path,
            metadata: package.metadata,
            toc,
            spine,
            manifest: package.manifest,
        };

        tracing::debug!(
            title = %book.metadata.title,
            spine = book.spine.len(),
            manifest = book.manifest.len(),
            "Parsed EPUB"
        );

        Ok(Self {
            archive: Mutex::new(archive),
            book,
            max_entry_bytes,
        })
    }

    pub fn book(&self) -> &ParsedBook {
        &self.book
    }

    /// Get chapter content by spine index
    pub fn get_chapter(&self, spine_index: usize) -> Result<ChapterContent, ParseError> {
        let item = self.book.spine.get(spine_index).ok_or_else(|| {
            ParseError::ContentError(format!("Spine index {} not found", spine_index))
        })?;

        let html = read_string(&mut *self.archive.lock(), &item.href, self.max_entry_bytes)?;

        Ok(ChapterContent {
            index: spine_index,
            href: item.href.clone(),
            html,
            title: self.book.toc_label(&item.href).map(str::to_string),
        })
    }

    /// Get a resource (image, CSS, font, etc.) by archive path
    pub fn get_resource(&self, href: &str) -> Result<Resource, ParseError> {
        let data = match read_entry(&mut *self.archive.lock(), href, self.max_entry_bytes) {
            Err(ParseError::MissingEntry(_)) => {
                return Err(ParseError::ResourceNotFound(href.to_string()))
            }
            other => other?,
        };

        let media_type = match self.book.manifest_item(href) {
            Some(item) => item.media_type.clone(),
            None => mime_guess::from_path(href)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        };

        Ok(Resource {
            href: href.to_string(),
            media_type,
            data,
        })
    }
}

/// Inflate one entry, never holding more than `max` bytes of it
fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    max: u64,
) -> Result<Vec<u8>, ParseError> {
    let file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Err(ParseError::MissingEntry(name.to_string())),
        Err(e) => return Err(ParseError::ContentError(format!("{}: {}", name, e))),
    };

    let too_large = |size: u64| ParseError::EntryTooLarge {
        name: name.to_string(),
        size,
        max,
    };

    // The declared size comes from the central directory and may lie
    let declared = file.size();
    if declared > max {
        return Err(too_large(declared));
    }

    let mut data = Vec::with_capacity(usize::try_from(declared).unwrap_or(0));
    file.take(max.saturating_add(1)).read_to_end(&mut data)?;
    if data.len() as u64 > max {
        return Err(too_large(data.len() as u64));
    }
    Ok(data)
}

fn read_string<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    max: u64,
) -> Result<String, ParseError> {
    let data = read_entry(archive, name, max)?;
    let text = String::from_utf8(data)
        .map_err(|e| ParseError::ContentError(format!("{} is not UTF-8: {}", name, e)))?;

    Ok(match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    })
}

/// Archive path of the first OPF rootfile
fn package_path(container_xml: &str) -> Result<String, ParseError> {
    let container: Container =
        quick_xml::de::from_str(container_xml).map_err(|e| xml_error(CONTAINER_PATH, e))?;

    container
        .rootfiles
        .rootfile
        .into_iter()
        .find(|root| {
            root.media_type
                .as_deref()
                .map_or(true, |t| t == "application/oebps-package+xml")
        })
        .map(|root| root.full_path.trim_start_matches('/').to_string())
        .filter(|path| !path.is_empty())
        .ok_or_else(|| ParseError::MissingEntry("package rootfile".to_string()))
}

fn xml_error(path: &str, reason: impl Display) -> ParseError {
    ParseError::XmlError {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Attribute value by local name (`epub:type` matches `type`)
fn attr(element: &BytesStart, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Element events reduced to what the handlers below need
enum XmlEvent<'a> {
    Open(&'a BytesStart<'a>),
    Text(String),
    Close(Vec<u8>),
}

/// Drive a streaming reader over `xml`, calling `handle` for each event.
///
/// Self-closing elements are reported as an open immediately followed by a
/// close. Text that fails to unescape (XHTML entities quick-xml does not
/// know) is passed through raw.
fn walk_xml(path: &str, xml: &str, mut handle: impl FnMut(XmlEvent<'_>)) -> Result<(), ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => handle(XmlEvent::Open(&e)),
            Ok(Event::Empty(e)) => {
                handle(XmlEvent::Open(&e));
                handle(XmlEvent::Close(e.local_name().as_ref().to_vec()));
            }
            Ok(Event::End(e)) => handle(XmlEvent::Close(e.local_name().as_ref().to_vec())),
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                handle(XmlEvent::Text(text));
            }
            Ok(Event::CData(c)) => handle(XmlEvent::Text(String::from_utf8_lossy(&c).into_owned())),
            Ok(Event::Eof) => return Ok(()),
            Err(e) => return Err(xml_error(path, e)),
            _ => {}
        }
    }
}

// ============================================================================
// Package document
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetadataField {
    Title,
    Creator,
    Language,
    Identifier,
}

#[derive(Debug, Default)]
struct Package {
    path: String,
    metadata: BookMetadata,
    manifest: Vec<ManifestItem>,
    /// (idref, linear) in document order
    itemrefs: Vec<(String, bool)>,
    /// Manifest id of the NCX named by `<spine toc="...">`
    ncx_id: Option<String>,
}

impl Package {
    fn resolve_spine(&self) -> Vec<SpineItem> {
        let mut spine = Vec::with_capacity(self.itemrefs.len());

        for (idref, linear) in &self.itemrefs {
            match self.manifest.iter().find(|item| &item.id == idref) {
                Some(item) => spine.push(SpineItem {
                    index: spine.len(),
                    idref: idref.clone(),
                    href: item.href.clone(),
                    linear: *linear,
                }),
                None => tracing::warn!(idref = %idref, "Spine references unknown manifest item"),
            }
        }

        spine
    }

    fn nav_document(&self) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.has_property("nav"))
    }

    fn ncx_document(&self) -> Option<&ManifestItem> {
        self.ncx_id
            .as_ref()
            .and_then(|id| self.manifest.iter().find(|item| &item.id == id))
            .or_else(|| self.manifest.iter().find(|item| item.media_type == NCX_MEDIA_TYPE))
    }
}

fn parse_package(package_path: &str, xml: &str) -> Result<Package, ParseError> {
    let mut package = Package {
        path: package_path.to_string(),
        ..Package::default()
    };
    let mut title: Option<String> = None;
    let mut in_metadata = false;
    let mut field: Option<(MetadataField, String)> = None;

    walk_xml(package_path, xml, |event| match event {
        XmlEvent::Open(e) => match e.local_name().as_ref() {
            b"metadata" => in_metadata = true,
            b"title" if in_metadata => field = Some((MetadataField::Title, String::new())),
            b"creator" if in_metadata => field = Some((MetadataField::Creator, String::new())),
            b"language" if in_metadata => field = Some((MetadataField::Language, String::new())),
            b"identifier" if in_metadata => {
                field = Some((MetadataField::Identifier, String::new()))
            }
            b"item" => {
                let href = attr(e, b"href").and_then(|href| path::resolve(package_path, &href));
                match (attr(e, b"id"), href) {
                    (Some(id), Some(href)) => package.manifest.push(ManifestItem {
                        id,
                        href,
                        media_type: attr(e, b"media-type")
                            .unwrap_or_else(|| "application/octet-stream".to_string()),
                        properties: attr(e, b"properties"),
                    }),
                    _ => tracing::warn!("Skipping manifest item without id or local href"),
                }
            }
            b"itemref" => {
                if let Some(idref) = attr(e, b"idref") {
                    let linear = attr(e, b"linear").as_deref() != Some("no");
                    package.itemrefs.push((idref, linear));
                }
            }
            b"spine" => package.ncx_id = attr(e, b"toc"),
            _ => {}
        },
        XmlEvent::Text(text) => {
            if let Some((_, value)) = field.as_mut() {
                value.push_str(&text);
            }
        }
        XmlEvent::Close(name) => {
            if name == b"metadata" {
                in_metadata = false;
            }
            if let Some((kind, value)) = field.take() {
                let value = value.trim().to_string();
                if value.is_empty() {
                    return;
                }
                let metadata = &mut package.metadata;
                match kind {
                    MetadataField::Title => {
                        title.get_or_insert(value);
                    }
                    MetadataField::Creator => metadata.creators.push(value),
                    MetadataField::Language => {
                        metadata.language.get_or_insert(value);
                    }
                    MetadataField::Identifier => {
                        metadata.identifier.get_or_insert(value);
                    }
                }
            }
        }
    })?;

    if let Some(title) = title {
        package.metadata.title = title;
    }

    Ok(package)
}

// ============================================================================
// Table of contents
// ============================================================================

fn load_toc<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    package: &Package,
    max_entry_bytes: u64,
) -> Result<Vec<TocEntry>, ParseError> {
    if let Some(nav) = package.nav_document() {
        let xml = read_string(archive, &nav.href, max_entry_bytes)?;
        let toc = parse_nav(&nav.href, &xml)?;
        if !toc.is_empty() {
            return Ok(toc);
        }
    }

    if let Some(ncx) = package.ncx_document() {
        let xml = read_string(archive, &ncx.href, max_entry_bytes)?;
        return parse_ncx(&ncx.href, &xml);
    }

    tracing::debug!(package = %package.path, "EPUB has no navigation document");
    Ok(Vec::new())
}

/// EPUB 3 navigation document: links inside `<nav epub:type="toc">`,
/// or inside the first `<nav>` when none is typed
fn parse_nav(nav_path: &str, xml: &str) -> Result<Vec<TocEntry>, ParseError> {
    let mut typed = Vec::new();
    let mut untyped = Vec::new();
    let mut current_nav: Option<bool> = None;
    let mut seen_nav = false;
    let mut link: Option<(Option<String>, String)> = None;

    walk_xml(nav_path, xml, |event| match event {
        XmlEvent::Open(e) => match e.local_name().as_ref() {
            b"nav" => {
                let is_toc = attr(e, b"type")
                    .map(|t| t.split_whitespace().any(|t| t == "toc"))
                    .unwrap_or(false);
                // Untyped links are only collected from the first nav
                current_nav = if is_toc || !seen_nav { Some(is_toc) } else { None };
                seen_nav = true;
            }
            b"a" if current_nav.is_some() => {
                let href = attr(e, b"href").and_then(|href| path::resolve(nav_path, &href));
                link = Some((href, String::new()));
            }
            _ => {}
        },
        XmlEvent::Text(text) => {
            if let Some((_, label)) = link.as_mut() {
                label.push_str(&text);
            }
        }
        XmlEvent::Close(name) => match name.as_slice() {
            b"a" => {
                if let (Some((Some(href), label)), Some(is_toc)) = (link.take(), current_nav) {
                    let entry = TocEntry {
                        label: label.trim().to_string(),
                        href,
                    };
                    if is_toc {
                        typed.push(entry);
                    } else {
                        untyped.push(entry);
                    }
                }
            }
            b"nav" => current_nav = None,
            _ => {}
        },
    })?;

    Ok(if typed.is_empty() { untyped } else { typed })
}

/// EPUB 2 NCX: every `navPoint` with its label and content target
fn parse_ncx(ncx_path: &str, xml: &str) -> Result<Vec<TocEntry>, ParseError> {
    let mut toc = Vec::new();
    let mut labels: Vec<String> = Vec::new();
    let mut in_text = false;

    walk_xml(ncx_path, xml, |event| match event {
        XmlEvent::Open(e) => match e.local_name().as_ref() {
            b"navPoint" => labels.push(String::new()),
            b"text" if !labels.is_empty() => in_text = true,
            b"content" => {
                let href = attr(e, b"src").and_then(|src| path::resolve(ncx_path, &src));
                if let (Some(href), Some(label)) = (href, labels.last()) {
                    toc.push(TocEntry {
                        label: label.trim().to_string(),
                        href,
                    });
                }
            }
            _ => {}
        },
        XmlEvent::Text(text) => {
            if in_text {
                if let Some(label) = labels.last_mut() {
                    label.push_str(&text);
                }
            }
        }
        XmlEvent::Close(name) => match name.as_slice() {
            b"text" => in_text = false,
            b"navPoint" => {
                labels.pop();
            }
            _ => {}
        },
    })?;

    Ok(toc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{zip_entries, EpubBuilder};

    #[test]
    fn test_parse_metadata_and_spine() {
        let data = EpubBuilder::new()
            .title("A Tale")
            .chapter("Opening", "<p>It was the best of times.</p>")
            .chapter("Middle", "<p>It was the worst of times.</p>")
            .build();

        let parser = EpubParser::from_bytes(data).unwrap();
        let book = parser.book();

        assert_eq!(book.package_path, "OEBPS/content.opf");
        assert_eq!(book.metadata.title, "A Tale");
        assert_eq!(book.metadata.creators, vec!["Test Author".to_string()]);
        assert_eq!(book.metadata.language.as_deref(), Some("en"));
        assert_eq!(book.spine.len(), 3);
        assert_eq!(book.spine[0].href, "OEBPS/text/ch1.xhtml");
        assert_eq!(book.linear_spine().count(), 2);
        assert!(!book.spine[2].linear);
    }

    #[test]
    fn test_ncx_titles() {
        let data = EpubBuilder::new()
            .chapter("Opening", "<p>One</p>")
            .chapter("Middle", "<p>Two</p>")
            .build();

        let parser = EpubParser::from_bytes(data).unwrap();
        let chapter = parser.get_chapter(1).unwrap();

        assert_eq!(chapter.title.as_deref(), Some("Middle"));
        assert!(chapter.html.contains("<p>Two</p>"));
    }

    #[test]
    fn test_nav_document_titles() {
        let data = EpubBuilder::new()
            .nav_document()
            .chapter("First &amp; Foremost", "<p>One</p>")
            .build();

        let parser = EpubParser::from_bytes(data).unwrap();
        assert_eq!(parser.book().toc[0].label, "First & Foremost");
        assert_eq!(parser.book().toc[0].href, "OEBPS/text/ch1.xhtml");
    }

    #[test]
    fn test_resource_media_type() {
        let data = EpubBuilder::new().chapter("One", "<p>One</p>").build();
        let parser = EpubParser::from_bytes(data).unwrap();

        let image = parser.get_resource("OEBPS/images/cover.png").unwrap();
        assert_eq!(image.media_type, "image/png");
        assert!(!image.data.is_empty());

        let css = parser.get_resource("OEBPS/styles/book.css").unwrap();
        assert_eq!(css.media_type, "text/css");
    }

    #[test]
    fn test_missing_resource() {
        let data = EpubBuilder::new().chapter("One", "<p>One</p>").build();
        let parser = EpubParser::from_bytes(data).unwrap();

        assert!(matches!(
            parser.get_resource("OEBPS/images/missing.png"),
            Err(ParseError::ResourceNotFound(_))
        ));
    }

    #[test]
    fn test_entry_inflating_past_limit_is_refused() {
        let data = EpubBuilder::new()
            .chapter("Bomb", &"<p>zzzzzzzzzzzzzzzz</p>".repeat(64 * 1024))
            .build();
        assert!(data.len() < 256 * 1024);

        let parser = EpubParser::with_entry_limit(data, 256 * 1024).unwrap();

        match parser.get_chapter(0) {
            Err(ParseError::EntryTooLarge { name, size, max }) => {
                assert_eq!(name, "OEBPS/text/ch1.xhtml");
                assert!(size > max);
                assert_eq!(max, 256 * 1024);
            }
            other => panic!("expected EntryTooLarge, got {:?}", other.map(|c| c.html.len())),
        }
    }

    #[test]
    fn test_entry_within_limit_is_read() {
        let data = EpubBuilder::new().chapter("Small", "<p>fits</p>").build();
        let parser = EpubParser::with_entry_limit(data, 64 * 1024).unwrap();

        assert!(parser.get_chapter(0).unwrap().html.contains("fits"));
    }

    #[test]
    fn test_not_a_zip() {
        assert!(matches!(
            EpubParser::from_bytes(b"<html>not an epub</html>".to_vec()),
            Err(ParseError::OpenError(_))
        ));
    }

    #[test]
    fn test_missing_container() {
        let data = zip_entries(&[("mimetype", b"application/epub+zip".as_slice())]);
        assert!(matches!(
            EpubParser::from_bytes(data),
            Err(ParseError::MissingEntry(name)) if name == CONTAINER_PATH
        ));
    }

    #[test]
    fn test_package_path_from_container() {
        let xml = r#"<?xml version="1.0"?>
            <container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
              <rootfiles>
                <rootfile full-path="OPS/package.opf" media-type="application/oebps-package+xml"/>
              </rootfiles>
            </container>"#;

        assert_eq!(package_path(xml).unwrap(), "OPS/package.opf");
    }

    #[test]
    fn test_unknown_idref_is_skipped() {
        let opf = r#"<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
            <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>T</dc:title></metadata>
            <manifest><item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/></manifest>
            <spine><itemref idref="ghost"/><itemref idref="c1"/></spine>
            </package>"#;

        let package = parse_package("content.opf", opf).unwrap();
        let spine = package.resolve_spine();

        assert_eq!(spine.len(), 1);
        assert_eq!(spine[0].index, 0);
        assert_eq!(spine[0].href, "c1.xhtml");
    }
}
