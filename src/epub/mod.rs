//! EPUB parsing module
//!
//! Opens EPUB archives held in memory with `zip` and reads the package
//! documents with `quick-xml`.

mod parser;
pub mod path;
mod types;

pub use parser::{EpubParser, ParseError};
pub use types::{BookMetadata, ChapterContent, ManifestItem, ParsedBook, Resource, SpineItem, TocEntry};
