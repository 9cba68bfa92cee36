//! Server-rendered pages
//!
//! Askama templates under `templates/`; values are HTML-escaped on render.

use askama::Template;
use uuid::Uuid;

/// An uploaded book as listed on the landing page
#[derive(Debug, Clone)]
pub struct BookLink {
    pub key: String,
    pub href: String,
}

#[derive(Template)]
#[template(path = "landing.html")]
pub struct LandingTemplate {
    pub books: Vec<BookLink>,
    /// URL to prefill
    pub url: String,
    /// Failure to report
    pub notice: Option<String>,
    pub can_submit: bool,
}

impl LandingTemplate {
    pub fn new(keys: Vec<String>, url: &str, notice: Option<String>) -> Self {
        let books = keys
            .into_iter()
            .map(|key| BookLink {
                href: open_book_href(&key),
                key,
            })
            .collect();

        Self {
            books,
            url: url.to_string(),
            notice,
            can_submit: !url.trim().is_empty(),
        }
    }
}

#[derive(Template)]
#[template(path = "reader.html")]
pub struct ReaderTemplate {
    pub view: Uuid,
    /// Document the view was opened for
    pub url: String,
}

/// Link that opens a stored book
pub fn open_book_href(key: &str) -> String {
    format!("/books/{}/open", urlencoding::encode(key))
}
