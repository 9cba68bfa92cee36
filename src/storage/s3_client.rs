//! S3-compatible storage client
//!
//! Wraps the AWS SDK for S3-compatible storage access.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    presigning::PresigningConfig,
    primitives::ByteStream,
    Client,
};
use axum::body::Bytes;

use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};

use super::store::ObjectBackend;
use super::types::{ListOptions, ObjectList, ObjectMetadata, SHA256_METADATA_KEY};

/// S3-compatible storage client
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
}

impl S3Client {
    /// Create a new S3 client from configuration
    pub async fn new(config: &StorageConfig) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "libros-reader",
        );

        let region = config
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint)
            .region(Region::new(region))
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO and other S3-compatible services
            .build();

        let client = Client::from_conf(s3_config);

        // Test connection by checking if bucket exists
        let bucket = config.bucket.clone();
        match client.head_bucket().bucket(&bucket).send().await {
            Ok(_) => {
                tracing::info!(bucket = %bucket, provider = ?config.provider, "Connected to S3 bucket");
            }
            Err(e) => {
                tracing::warn!(
                    "Could not verify bucket {}: {}. Will attempt operations anyway.",
                    bucket,
                    DisplayErrorContext(&e)
                );
            }
        }

        Ok(Self { client, bucket })
    }

    /// List one page of objects in the bucket
    pub async fn list_objects(&self, options: ListOptions) -> StorageResult<ObjectList> {
        let mut request = self.client.list_objects_v2().bucket(&self.bucket);

        if let Some(max_keys) = options.max_keys {
            request = request.max_keys(max_keys);
        }

        if let Some(token) = options.continuation_token {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify(&self.bucket, format!("Failed to list objects: {}", DisplayErrorContext(&e))))?;

        let objects: Vec<ObjectMetadata> = response
            .contents()
            .iter()
            .map(|obj| ObjectMetadata {
                key: obj.key().unwrap_or_default().to_string(),
                sha256: None, // user metadata needs a HEAD
            })
            .collect();

        Ok(ObjectList {
            objects,
            continuation_token: response.next_continuation_token().map(|s| s.to_string()),
            is_truncated: response.is_truncated().unwrap_or(false),
        })
    }

    /// Get object metadata (HEAD request)
    pub async fn head_object(&self, key: &str) -> StorageResult<ObjectMetadata> {
        let response = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(key, format!("Failed to head object {}: {}", key, DisplayErrorContext(&e))))?;

        Ok(ObjectMetadata {
            key: key.to_string(),
            sha256: response
                .metadata()
                .and_then(|m| m.get(SHA256_METADATA_KEY))
                .cloned(),
        })
    }

    /// Store an object, recording its digest as user metadata
    pub async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        sha256: &str,
    ) -> StorageResult<()> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .metadata(SHA256_METADATA_KEY, sha256)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| classify(key, format!("Failed to put object {}: {}", key, DisplayErrorContext(&e))))?;

        tracing::debug!(key = %key, size, "Stored object");
        Ok(())
    }

    /// Presign a GET for `key`, valid for `ttl`
    pub async fn presign_get(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        let presigning = PresigningConfig::expires_in(ttl).map_err(|e| StorageError::PresignFailed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::PresignFailed {
                key: key.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(request.uri().to_string())
    }

    /// List every object in the bucket (handles pagination)
    pub async fn list_all_objects(&self) -> StorageResult<Vec<ObjectMetadata>> {
        let mut all_objects = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut options = ListOptions::new().with_max_keys(1000);

            if let Some(token) = continuation_token.take() {
                options = options.with_continuation_token(token);
            }

            let result = self.list_objects(options).await?;
            all_objects.extend(result.objects);

            if !result.is_truncated {
                break;
            }

            continuation_token = result.continuation_token;
        }

        Ok(all_objects)
    }
}

#[async_trait]
impl ObjectBackend for S3Client {
    async fn head(&self, key: &str) -> StorageResult<Option<ObjectMetadata>> {
        match self.head_object(key).await {
            Ok(metadata) => Ok(Some(metadata)),
            Err(StorageError::ObjectNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str, sha256: &str) -> StorageResult<()> {
        self.put_object(key, data, content_type, sha256).await
    }

    async fn list_keys(&self) -> StorageResult<Vec<String>> {
        let objects = self.list_all_objects().await?;
        Ok(objects.into_iter().map(|o| o.key).collect())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        S3Client::presign_get(self, key, ttl).await
    }
}

/// Map an SDK failure message onto the storage error taxonomy
fn classify(subject: &str, message: String) -> StorageError {
    if message.contains("404") || message.contains("NoSuchKey") || message.contains("NotFound") {
        StorageError::ObjectNotFound(subject.to_string())
    } else if message.contains("403") || message.contains("AccessDenied") {
        StorageError::AccessDenied(message)
    } else if message.contains("dispatch failure") || message.contains("timeout") {
        StorageError::ConnectionFailed(message)
    } else {
        StorageError::SdkError(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_found() {
        let err = classify("a.epub", "service error: NoSuchKey".to_string());
        assert!(matches!(err, StorageError::ObjectNotFound(key) if key == "a.epub"));
    }

    #[test]
    fn test_classify_access_denied() {
        let err = classify("a.epub", "AccessDenied: signature mismatch".to_string());
        assert!(matches!(err, StorageError::AccessDenied(_)));
    }

    #[test]
    fn test_classify_dispatch_failure() {
        let err = classify("books", "dispatch failure: connection refused".to_string());
        assert!(matches!(err, StorageError::ConnectionFailed(_)));
    }
}
