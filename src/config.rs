//! Configuration management for Libros Reader

use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub reader: ReaderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
    /// Validity window of presigned read URLs, in seconds
    pub presign_ttl_secs: u64,
    pub collision_policy: CollisionPolicy,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Minio,
    R2,
    S3,
    B2,
}

/// What to do when an upload's key is already taken in the bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Replace the existing object
    Overwrite,
    /// Fail the upload
    Reject,
    /// Store under the first free `name-N.ext` key
    Version,
}

impl CollisionPolicy {
    fn from_env_value(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "overwrite" => Self::Overwrite,
            "reject" => Self::Reject,
            _ => Self::Version,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReaderConfig {
    pub fetch_timeout_secs: u64,
    pub max_document_bytes: usize,
    /// Cap on the inflated size of a single archive entry (chapter, image, ...)
    pub max_entry_bytes: usize,
    /// Reader views without activity for this long are closed by the sweeper
    pub view_idle_secs: u64,
}

impl StorageConfig {
    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_secs)
    }
}

impl ReaderConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn view_idle(&self) -> Duration {
        Duration::from_secs(self.view_idle_secs)
    }
}

const DEFAULT_PRESIGN_TTL_SECS: u64 = 3600;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_ENTRY_BYTES: usize = 32 * 1024 * 1024;
const DEFAULT_VIEW_IDLE_SECS: u64 = 30 * 60;

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            storage: StorageConfig {
                provider: StorageProvider::Minio,
                endpoint: "http://localhost:9000".to_string(),
                bucket: "books".to_string(),
                access_key: "admin".to_string(),
                secret_key: "password123".to_string(),
                region: Some("us-east-1".to_string()),
                presign_ttl_secs: DEFAULT_PRESIGN_TTL_SECS,
                collision_policy: CollisionPolicy::Version,
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
            reader: ReaderConfig {
                fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
                max_document_bytes: DEFAULT_MAX_UPLOAD_BYTES,
                max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
                view_idle_secs: DEFAULT_VIEW_IDLE_SECS,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_or("SERVER_PORT", 3000),
            },
            storage: StorageConfig {
                provider: match env::var("S3_PROVIDER").unwrap_or_else(|_| "minio".to_string()).as_str() {
                    "r2" => StorageProvider::R2,
                    "s3" => StorageProvider::S3,
                    "b2" => StorageProvider::B2,
                    _ => StorageProvider::Minio,
                },
                endpoint: env::var("S3_ENDPOINT")?,
                bucket: env::var("S3_BUCKET")?,
                access_key: env::var("S3_ACCESS_KEY")?,
                secret_key: env::var("S3_SECRET_KEY")?,
                region: env::var("S3_REGION").ok(),
                presign_ttl_secs: parse_or("S3_PRESIGN_TTL_SECS", DEFAULT_PRESIGN_TTL_SECS),
                collision_policy: CollisionPolicy::from_env_value(
                    &env::var("UPLOAD_COLLISION_POLICY").unwrap_or_default(),
                ),
                max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            },
            reader: ReaderConfig {
                fetch_timeout_secs: parse_or("READER_FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS),
                max_document_bytes: parse_or("READER_MAX_DOCUMENT_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
                max_entry_bytes: parse_or("READER_MAX_ENTRY_BYTES", DEFAULT_MAX_ENTRY_BYTES),
                view_idle_secs: parse_or("READER_VIEW_IDLE_SECS", DEFAULT_VIEW_IDLE_SECS),
            },
        })
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
