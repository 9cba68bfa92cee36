//! Storage types

use std::time::Duration;

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::InputError;

/// Object metadata key holding the hex SHA-256 of the uploaded bytes
pub const SHA256_METADATA_KEY: &str = "sha256";

/// Content type stored for EPUB uploads
pub const EPUB_CONTENT_TYPE: &str = "application/epub+zip";

/// Metadata about a storage object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub key: String,
    /// Content digest recorded at upload time, if any
    pub sha256: Option<String>,
}

/// List of objects with optional continuation token
#[derive(Debug, Clone, Serialize)]
pub struct ObjectList {
    pub objects: Vec<ObjectMetadata>,
    pub continuation_token: Option<String>,
    pub is_truncated: bool,
}

/// Options for listing objects
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub max_keys: Option<i32>,
    pub continuation_token: Option<String>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_keys(mut self, max_keys: i32) -> Self {
        self.max_keys = Some(max_keys);
        self
    }

    pub fn with_continuation_token(mut self, token: impl Into<String>) -> Self {
        self.continuation_token = Some(token.into());
        self
    }
}

/// A file chosen for upload, keyed by its own base name
#[derive(Debug, Clone)]
pub struct BookUpload {
    pub key: String,
    pub content_type: String,
    pub data: Bytes,
}

impl BookUpload {
    /// Build an upload from a client-supplied file name.
    ///
    /// Browsers may send full paths (`C:\Books\a.epub`); only the last
    /// component is kept.
    pub fn new(file_name: &str, data: Bytes) -> Result<Self, InputError> {
        let key = file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        if key.is_empty() || key == "." || key == ".." || key.chars().any(char::is_control) {
            return Err(InputError::InvalidFileName(file_name.to_string()));
        }

        let content_type = if key.to_lowercase().ends_with(".epub") {
            EPUB_CONTENT_TYPE.to_string()
        } else {
            mime_guess::from_path(&key)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        };

        Ok(Self {
            key,
            content_type,
            data,
        })
    }

    /// Hex SHA-256 of the payload
    pub fn sha256(&self) -> String {
        hex::encode(Sha256::digest(&self.data))
    }
}

/// A presigned, time-limited read URL for one key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrl {
    pub key: String,
    pub url: String,
    pub expires_in_secs: u64,
    pub expires_at: DateTime<Utc>,
}

impl SignedUrl {
    pub fn new(key: impl Into<String>, url: impl Into<String>, expires_in: Duration) -> Self {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(expires_in).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            key: key.into(),
            url: url.into(),
            expires_in_secs: expires_in.as_secs(),
            expires_at,
        }
    }
}
