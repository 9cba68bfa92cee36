//! Storage module for S3-compatible backends
//!
//! Supports MinIO, Cloudflare R2, Backblaze B2, and AWS S3.

mod s3_client;
mod store;
mod types;

pub use s3_client::S3Client;
pub use store::{BookStore, ObjectBackend, ObjectBookStore};
pub use types::*;

/// The production store: S3 objects behind the [`BookStore`] contract
pub type S3BookStore = ObjectBookStore<S3Client>;
