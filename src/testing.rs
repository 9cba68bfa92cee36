//! Test doubles and fixtures shared by the unit tests

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use parking_lot::Mutex;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::epub::Resource;
use crate::error::{LoadError, StorageError, StorageResult};
use crate::reader::{Location, Page, RenderEngine, RenderOptions, Rendition, Section};
use crate::storage::{BookStore, BookUpload, ObjectBackend, ObjectMetadata, SignedUrl};

// ============================================================================
// Storage
// ============================================================================

/// In-memory [`ObjectBackend`]
#[derive(Default)]
pub struct MemoryBackend {
    objects: Mutex<BTreeMap<String, (Bytes, String)>>,
    puts: AtomicUsize,
    presigns: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn presign_count(&self) -> usize {
        self.presigns.load(Ordering::SeqCst)
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().get(key).map(|(data, _)| data.clone())
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    async fn head(&self, key: &str) -> StorageResult<Option<ObjectMetadata>> {
        Ok(self.objects.lock().get(key).map(|(_, sha256)| ObjectMetadata {
            key: key.to_string(),
            sha256: Some(sha256.clone()),
        }))
    }

    async fn put(&self, key: &str, data: Bytes, _content_type: &str, sha256: &str) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::SdkError("write refused".to_string()));
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .insert(key.to_string(), (data, sha256.to_string()));
        Ok(())
    }

    async fn list_keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.objects.lock().keys().cloned().collect())
    }

    async fn presign_get(&self, key: &str, _ttl: Duration) -> StorageResult<String> {
        self.presigns.fetch_add(1, Ordering::SeqCst);
        Ok(FakeStore::signed_url(key))
    }
}

/// [`BookStore`] that records every call
#[derive(Default)]
pub struct FakeStore {
    books: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
    fail_uploads: bool,
    fail_list: bool,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_books(keys: &[&str]) -> Self {
        let store = Self::new();
        store
            .books
            .lock()
            .extend(keys.iter().map(|k| k.to_string()));
        store
    }

    pub fn fail_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    pub fn fail_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    /// Calls in order, as `"<operation> <key>"`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn signed_url(key: &str) -> String {
        format!("https://storage.test/books/{}?X-Amz-Signature=test", key)
    }
}

#[async_trait]
impl BookStore for FakeStore {
    async fn upload(&self, upload: BookUpload) -> StorageResult<String> {
        self.calls.lock().push(format!("upload {}", upload.key));
        if self.fail_uploads {
            return Err(StorageError::SdkError("upload refused".to_string()));
        }
        self.books.lock().push(upload.key.clone());
        Ok(upload.key)
    }

    async fn list(&self) -> StorageResult<Vec<String>> {
        self.calls.lock().push("list".to_string());
        if self.fail_list {
            return Err(StorageError::ConnectionFailed("bucket unreachable".to_string()));
        }
        Ok(self.books.lock().clone())
    }

    async fn sign(&self, key: &str) -> StorageResult<SignedUrl> {
        self.calls.lock().push(format!("sign {}", key));
        if !self.books.lock().iter().any(|k| k == key) {
            return Err(StorageError::ObjectNotFound(key.to_string()));
        }
        Ok(SignedUrl::new(key, Self::signed_url(key), Duration::from_secs(3600)))
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Observes whether a rendition was disposed
#[derive(Clone, Default)]
pub struct DisposeWatch(Arc<AtomicBool>);

impl DisposeWatch {
    pub fn is_disposed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Rendition over `total` one-section pages with trivial markup
pub struct FakeRendition {
    total: usize,
    start: usize,
    /// Time every display takes, standing in for a heavy section
    delay: Duration,
    disposed: DisposeWatch,
}

impl FakeRendition {
    pub fn boxed(total: usize) -> (Box<dyn Rendition>, DisposeWatch) {
        Self::boxed_slow(total, Duration::ZERO)
    }

    pub fn boxed_slow(total: usize, delay: Duration) -> (Box<dyn Rendition>, DisposeWatch) {
        let watch = DisposeWatch::default();
        let rendition = Self {
            total,
            start: 0,
            delay,
            disposed: watch.clone(),
        };
        (Box::new(rendition), watch)
    }
}

impl Rendition for FakeRendition {
    fn display(&mut self) -> Result<Page, LoadError> {
        if self.disposed.is_disposed() {
            return Err(LoadError::Disposed);
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let section = Section {
            index: self.start,
            href: format!("OEBPS/s{}.xhtml", self.start),
            title: None,
            html: format!(r#"<p>Section {}</p><img src="img/s{}.png"/>"#, self.start, self.start),
        };
        Ok(Page::new(self.location(), vec![section]))
    }

    fn prev(&mut self) -> Result<Page, LoadError> {
        self.start = self.start.saturating_sub(1);
        self.display()
    }

    fn next(&mut self) -> Result<Page, LoadError> {
        if self.start + 1 < self.total {
            self.start += 1;
        }
        self.display()
    }

    fn location(&self) -> Location {
        Location {
            start: self.start,
            end: self.start + 1,
            total: self.total,
        }
    }

    fn resource(&self, href: &str) -> Result<Resource, LoadError> {
        Ok(Resource {
            href: href.to_string(),
            media_type: "image/png".to_string(),
            data: b"\x89PNG".to_vec(),
        })
    }

    fn dispose(&mut self) {
        self.disposed.0.store(true, Ordering::SeqCst);
    }
}

/// [`RenderEngine`] that records loads and hands out [`FakeRendition`]s
#[derive(Default)]
pub struct FakeEngine {
    loads: Mutex<Vec<(String, RenderOptions)>>,
    watches: Mutex<Vec<DisposeWatch>>,
    fail: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn loads(&self) -> Vec<(String, RenderOptions)> {
        self.loads.lock().clone()
    }

    /// One watch per rendition handed out, in load order
    pub fn watches(&self) -> Vec<DisposeWatch> {
        self.watches.lock().clone()
    }
}

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn load(&self, url: &str, options: RenderOptions) -> Result<Box<dyn Rendition>, LoadError> {
        self.loads.lock().push((url.to_string(), options));
        if self.fail {
            return Err(LoadError::Fetch("connection refused".to_string()));
        }
        let (rendition, watch) = FakeRendition::boxed(3);
        self.watches.lock().push(watch);
        Ok(rendition)
    }
}

// ============================================================================
// EPUB fixtures
// ============================================================================

/// Zip archive from raw `(name, contents)` entries
pub fn zip_entries(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        let options = if *name == "mimetype" {
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
        } else {
            SimpleFileOptions::default()
        };
        zip.start_file(*name, options).unwrap();
        zip.write_all(contents).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Builds a small EPUB: chapters under `OEBPS/text/`, a stylesheet, a cover
/// image, and a trailing non-linear notes document
pub struct EpubBuilder {
    title: String,
    chapters: Vec<(String, String)>,
    nav_document: bool,
}

impl Default for EpubBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EpubBuilder {
    pub fn new() -> Self {
        Self {
            title: "Test Book".to_string(),
            chapters: Vec::new(),
            nav_document: false,
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    /// `title` is inserted as XML text, so entities must already be escaped
    pub fn chapter(mut self, title: &str, body: &str) -> Self {
        self.chapters.push((title.to_string(), body.to_string()));
        self
    }

    /// Use an EPUB 3 navigation document instead of an NCX
    pub fn nav_document(mut self) -> Self {
        self.nav_document = true;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut manifest = String::new();
        let mut spine = String::new();
        let mut nav_points = String::new();
        let mut nav_links = String::new();
        let mut files: Vec<(String, Vec<u8>)> = Vec::new();

        for (i, (title, body)) in self.chapters.iter().enumerate() {
            let n = i + 1;
            manifest.push_str(&format!(
                r#"<item id="ch{n}" href="text/ch{n}.xhtml" media-type="application/xhtml+xml"/>"#
            ));
            spine.push_str(&format!(r#"<itemref idref="ch{n}"/>"#));
            nav_points.push_str(&format!(
                r#"<navPoint id="np{n}" playOrder="{n}"><navLabel><text>{title}</text></navLabel><content src="text/ch{n}.xhtml"/></navPoint>"#
            ));
            nav_links.push_str(&format!(r#"<li><a href="text/ch{n}.xhtml">{title}</a></li>"#));
            files.push((
                format!("OEBPS/text/ch{n}.xhtml"),
                chapter_xhtml(title, body).into_bytes(),
            ));
        }

        manifest.push_str(r#"<item id="notes" href="text/notes.xhtml" media-type="application/xhtml+xml"/>"#);
        spine.push_str(r#"<itemref idref="notes" linear="no"/>"#);
        files.push((
            "OEBPS/text/notes.xhtml".to_string(),
            chapter_xhtml("Notes", "<p>Notes</p>").into_bytes(),
        ));

        manifest.push_str(r#"<item id="css" href="styles/book.css" media-type="text/css"/>"#);
        manifest.push_str(r#"<item id="cover" href="images/cover.png" media-type="image/png" properties="cover-image"/>"#);
        files.push(("OEBPS/styles/book.css".to_string(), b"p { margin: 0; }".to_vec()));
        files.push(("OEBPS/images/cover.png".to_string(), b"\x89PNG\r\n\x1a\n".to_vec()));

        let spine_attrs = if self.nav_document {
            manifest.push_str(r#"<item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>"#);
            files.push((
                "OEBPS/nav.xhtml".to_string(),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>Contents</title></head>
<body><nav epub:type="toc"><ol>{nav_links}</ol></nav></body>
</html>"#
                )
                .into_bytes(),
            ));
            String::new()
        } else {
            manifest.push_str(r#"<item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>"#);
            files.push((
                "OEBPS/toc.ncx".to_string(),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
<docTitle><text>{title}</text></docTitle>
<navMap>{nav_points}</navMap>
</ncx>"#,
                    title = self.title
                )
                .into_bytes(),
            ));
            r#" toc="ncx""#.to_string()
        };

        let opf = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:uuid:0000-test</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:creator>Test Author</dc:creator>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>{manifest}</manifest>
  <spine{spine_attrs}>{spine}</spine>
</package>"#,
            title = self.title
        );

        let container = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

        let mut entries: Vec<(&str, &[u8])> = vec![
            ("mimetype", b"application/epub+zip".as_slice()),
            ("META-INF/container.xml", container.as_bytes()),
            ("OEBPS/content.opf", opf.as_bytes()),
        ];
        entries.extend(files.iter().map(|(name, data)| (name.as_str(), data.as_slice())));
        zip_entries(&entries)
    }
}

fn chapter_xhtml(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>{title}</title><link rel="stylesheet" href="../styles/book.css"/></head>
<body>{body}<img src="../images/cover.png" alt="cover"/></body>
</html>"#
    )
}
