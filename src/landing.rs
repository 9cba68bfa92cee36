//! Landing form controller
//!
//! Resolves what the reader typed or picked into one navigable URL. A typed
//! URL and a chosen file are mutually exclusive: setting one clears the
//! other.

use axum::body::Bytes;

use crate::error::{InputError, Result};
use crate::storage::{BookStore, BookUpload};

/// A file picked on the landing page
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    pub data: Bytes,
}

/// Landing form state
#[derive(Debug, Clone, Default)]
pub struct LandingForm {
    url: String,
    file: Option<SelectedFile>,
}

impl LandingForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Typing a URL clears any chosen file
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
        if !self.url.trim().is_empty() {
            self.file = None;
        }
    }

    /// Choosing a file clears the typed URL
    pub fn select_file(&mut self, file: SelectedFile) {
        self.url.clear();
        self.file = Some(file);
    }

    pub fn clear_file(&mut self) {
        self.file = None;
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn file(&self) -> Option<&SelectedFile> {
        self.file.as_ref()
    }

    /// Whether the submit action is available
    pub fn can_submit(&self) -> bool {
        !self.url.trim().is_empty() || self.file.is_some()
    }

    /// Resolve the form into a reader navigation.
    ///
    /// A typed URL is used as-is. A chosen file is uploaded and its key
    /// signed; the signed URL is opened.
    pub async fn submit(&self, store: &dyn BookStore) -> Result<Navigation> {
        if !self.url.trim().is_empty() {
            return Ok(Navigation::reader(self.url.clone()));
        }

        let Some(file) = &self.file else {
            return Err(InputError::Empty.into());
        };

        let upload = BookUpload::new(&file.name, file.data.clone())?;
        let key = store.upload(upload).await?;
        open_existing(store, &key).await
    }
}

/// Sign a stored book and navigate to it
pub async fn open_existing(store: &dyn BookStore, key: &str) -> Result<Navigation> {
    let signed = store.sign(key).await?;
    Ok(Navigation::reader(signed.url))
}

/// Where the browser goes next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    document_url: String,
}

impl Navigation {
    pub fn reader(document_url: impl Into<String>) -> Self {
        Self {
            document_url: document_url.into(),
        }
    }

    pub fn document_url(&self) -> &str {
        &self.document_url
    }

    /// `/reader?url=...`, encoded like `encodeURIComponent`
    pub fn location(&self) -> String {
        format!("/reader?url={}", urlencoding::encode(&self.document_url))
    }
}
