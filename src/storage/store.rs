//! Book store
//!
//! The three operations the pages need (upload, list, sign) on top of an
//! object backend. Key collisions are resolved here according to the
//! configured [`CollisionPolicy`].

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;

use crate::config::CollisionPolicy;
use crate::error::{StorageError, StorageResult};

use super::types::{BookUpload, ObjectMetadata, SignedUrl};

/// Highest version suffix tried before giving up on a free key
const MAX_VERSION_SUFFIX: u32 = 999;

/// Book storage as seen by the landing and reader pages
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Store the file and return the key it was stored under
    async fn upload(&self, upload: BookUpload) -> StorageResult<String>;

    /// Every key in the bucket, in backend order
    async fn list(&self) -> StorageResult<Vec<String>>;

    /// A time-limited read URL for `key`
    async fn sign(&self, key: &str) -> StorageResult<SignedUrl>;
}

/// Raw object operations a [`BookStore`] is built on
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Metadata for `key`, or `None` if it does not exist
    async fn head(&self, key: &str) -> StorageResult<Option<ObjectMetadata>>;

    async fn put(&self, key: &str, data: Bytes, content_type: &str, sha256: &str) -> StorageResult<()>;

    async fn list_keys(&self) -> StorageResult<Vec<String>>;

    async fn presign_get(&self, key: &str, ttl: Duration) -> StorageResult<String>;
}

/// [`BookStore`] over any [`ObjectBackend`]
pub struct ObjectBookStore<B> {
    backend: B,
    policy: CollisionPolicy,
    presign_ttl: Duration,
}

/// Where an upload should land
#[derive(Debug, PartialEq, Eq)]
enum KeyResolution {
    /// Nothing stored under this key yet (or overwrite allowed)
    Write(String),
    /// Identical content already stored under this key
    Existing(String),
}

impl<B: ObjectBackend> ObjectBookStore<B> {
    pub fn new(backend: B, policy: CollisionPolicy, presign_ttl: Duration) -> Self {
        Self {
            backend,
            policy,
            presign_ttl,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn resolve_key(&self, key: &str, sha256: &str) -> StorageResult<KeyResolution> {
        if self.policy == CollisionPolicy::Overwrite {
            return Ok(KeyResolution::Write(key.to_string()));
        }

        let mut candidate = key.to_string();
        let mut suffix = 0;

        loop {
            let Some(existing) = self.backend.head(&candidate).await? else {
                return Ok(KeyResolution::Write(candidate));
            };

            if existing.sha256.as_deref() == Some(sha256) {
                return Ok(KeyResolution::Existing(candidate));
            }

            if self.policy == CollisionPolicy::Reject || suffix >= MAX_VERSION_SUFFIX {
                return Err(StorageError::KeyExists(key.to_string()));
            }

            suffix += 1;
            candidate = versioned_key(key, suffix);
        }
    }
}

#[async_trait]
impl<B: ObjectBackend> BookStore for ObjectBookStore<B> {
    async fn upload(&self, upload: BookUpload) -> StorageResult<String> {
        let sha256 = upload.sha256();

        match self.resolve_key(&upload.key, &sha256).await? {
            KeyResolution::Existing(key) => {
                tracing::info!(key = %key, sha256 = %sha256, "Upload matches stored book, skipping write");
                Ok(key)
            }
            KeyResolution::Write(key) => {
                let size = upload.data.len();
                self.backend
                    .put(&key, upload.data, &upload.content_type, &sha256)
                    .await?;
                tracing::info!(key = %key, size, "Uploaded book");
                Ok(key)
            }
        }
    }

    async fn list(&self) -> StorageResult<Vec<String>> {
        let keys = self.backend.list_keys().await?;
        tracing::debug!(count = keys.len(), "Listed books");
        Ok(keys)
    }

    async fn sign(&self, key: &str) -> StorageResult<SignedUrl> {
        // A presigned URL for a missing key is still a valid signature, so check first
        if self.backend.head(key).await?.is_none() {
            return Err(StorageError::ObjectNotFound(key.to_string()));
        }

        let url = self.backend.presign_get(key, self.presign_ttl).await?;
        tracing::debug!(key = %key, ttl_secs = self.presign_ttl.as_secs(), "Signed read URL");
        Ok(SignedUrl::new(key, url, self.presign_ttl))
    }
}

/// `book.epub` -> `book-2.epub`; names without an extension get a plain suffix
fn versioned_key(key: &str, suffix: u32) -> String {
    match key.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}-{}.{}", stem, suffix, ext),
        _ => format!("{}-{}", key, suffix),
    }
}
