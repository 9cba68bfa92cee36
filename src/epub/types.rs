//! EPUB data types
//!
//! Core types for representing parsed EPUB content. All hrefs are
//! normalized archive paths (see [`super::path`]).

use serde::Serialize;

/// A parsed EPUB package
#[derive(Debug, Clone, Serialize)]
pub struct ParsedBook {
    /// Archive path of the OPF package document
    pub package_path: String,
    /// Book metadata
    pub metadata: BookMetadata,
    /// Table of contents, flattened in document order
    pub toc: Vec<TocEntry>,
    /// Reading order (spine)
    pub spine: Vec<SpineItem>,
    /// Manifest items (all resources)
    pub manifest: Vec<ManifestItem>,
}

impl ParsedBook {
    /// Spine items that belong to the primary reading order
    pub fn linear_spine(&self) -> impl Iterator<Item = &SpineItem> {
        self.spine.iter().filter(|item| item.linear)
    }

    pub fn manifest_item(&self, href: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.href == href)
    }

    /// TOC label for a content document, ignoring fragments
    pub fn toc_label(&self, href: &str) -> Option<&str> {
        self.toc
            .iter()
            .find(|entry| entry.href == href)
            .map(|entry| entry.label.as_str())
    }
}

/// Dublin Core fields of the package
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookMetadata {
    pub title: String,
    pub creators: Vec<String>,
    pub language: Option<String>,
    pub identifier: Option<String>,
}

impl Default for BookMetadata {
    fn default() -> Self {
        Self {
            title: "Unknown".to_string(),
            creators: Vec::new(),
            language: None,
            identifier: None,
        }
    }
}

/// A labelled navigation target
#[derive(Debug, Clone, Serialize)]
pub struct TocEntry {
    pub label: String,
    /// Target document, without fragment
    pub href: String,
}

/// One itemref of the spine
#[derive(Debug, Clone, Serialize)]
pub struct SpineItem {
    /// Position in the spine, linear or not
    pub index: usize,
    pub idref: String,
    /// Archive path of the content document
    pub href: String,
    /// `false` for `linear="no"` items (notes, popups)
    pub linear: bool,
}

/// A file declared by the package
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    /// Space-separated properties (nav, cover-image, ...)
    pub properties: Option<String>,
}

impl ManifestItem {
    pub fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_deref()
            .map(|props| props.split_whitespace().any(|p| p == property))
            .unwrap_or(false)
    }
}

/// A spine document ready for display
#[derive(Debug, Clone)]
pub struct ChapterContent {
    pub index: usize,
    pub href: String,
    /// Raw XHTML
    pub html: String,
    /// Navigation label, when the TOC names this document
    pub title: Option<String>,
}

/// Raw bytes of an archive member and the type to serve them with
#[derive(Debug, Clone)]
pub struct Resource {
    pub href: String,
    pub media_type: String,
    pub data: Vec<u8>,
}
