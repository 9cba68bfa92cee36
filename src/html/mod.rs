//! HTML processing
//!
//! Rewrites book sections for display in the reader viewport.

pub mod viewport;

pub use viewport::{resource_prefix, resource_url, rewrite_section, RewriteError};
