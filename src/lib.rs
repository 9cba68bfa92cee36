//! Libros Reader
//!
//! A browser EPUB reader: a landing page to pick a book by URL or upload it
//! to S3-compatible storage, and a paginated reader page.

pub mod config;
pub mod epub;
pub mod error;
pub mod html;
pub mod landing;
pub mod pages;
pub mod reader;
pub mod routes;
pub mod state;
pub mod storage;

#[cfg(test)]
mod testing;
