//! EPUB rendering engine
//!
//! Fetches a document over HTTP, parses it, and pages through the linear
//! spine a spread at a time.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::config::ReaderConfig;
use crate::epub::{EpubParser, Resource};
use crate::error::LoadError;

use super::rendition::{Location, Page, RenderEngine, RenderOptions, Rendition, Section};

/// [`RenderEngine`] for EPUB documents reachable over http(s)
#[derive(Clone)]
pub struct EpubEngine {
    client: reqwest::Client,
    max_document_bytes: usize,
    max_entry_bytes: usize,
}

impl EpubEngine {
    pub fn new(config: &ReaderConfig) -> Result<Self, LoadError> {
        Self::with_limits(
            config.fetch_timeout(),
            config.max_document_bytes,
            config.max_entry_bytes,
        )
    }

    pub fn with_limits(
        timeout: Duration,
        max_document_bytes: usize,
        max_entry_bytes: usize,
    ) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("libros-reader/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LoadError::Fetch(e.to_string()))?;

        Ok(Self {
            client,
            max_document_bytes,
            max_entry_bytes,
        })
    }

    /// Download the document body, enforcing the size cap while streaming
    async fn fetch(&self, url: Url) -> Result<Vec<u8>, LoadError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LoadError::Fetch(e.without_url().to_string()))?;

        let max = self.max_document_bytes;
        if let Some(size) = response.content_length() {
            let size = usize::try_from(size).unwrap_or(usize::MAX);
            if size > max {
                return Err(LoadError::TooLarge { size, max });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| LoadError::Fetch(e.without_url().to_string()))?
        {
            if body.len() + chunk.len() > max {
                return Err(LoadError::TooLarge {
                    size: body.len() + chunk.len(),
                    max,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

/// Only absolute http(s) URLs are fetched
pub fn parse_document_url(url: &str) -> Result<Url, LoadError> {
    let parsed = Url::parse(url.trim()).map_err(|e| LoadError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(LoadError::InvalidUrl(format!("unsupported scheme {}", scheme))),
    }
}

#[async_trait]
impl RenderEngine for EpubEngine {
    async fn load(&self, url: &str, options: RenderOptions) -> Result<Box<dyn Rendition>, LoadError> {
        let url = parse_document_url(url)?;
        // Signed URLs carry credentials in the query string; keep them out of logs
        let host = url.host_str().unwrap_or_default().to_string();
        let path = url.path().to_string();

        let data = self.fetch(url).await?;
        tracing::debug!(host = %host, path = %path, size = data.len(), "Fetched document");

        let parser = EpubParser::with_entry_limit(data, self.max_entry_bytes as u64)?;
        let rendition = EpubRendition::new(parser, options)?;
        tracing::info!(
            host = %host,
            path = %path,
            sections = rendition.order.len(),
            per_page = rendition.per_page,
            "Loaded rendition"
        );

        Ok(Box::new(rendition))
    }
}

/// A parsed EPUB paged through its linear spine
pub struct EpubRendition {
    parser: Option<EpubParser>,
    /// Spine indices of the linear reading order
    order: Vec<usize>,
    per_page: usize,
    /// Position in `order` of the first displayed section
    start: usize,
}

impl EpubRendition {
    pub fn new(parser: EpubParser, options: RenderOptions) -> Result<Self, LoadError> {
        let order: Vec<usize> = parser.book().linear_spine().map(|item| item.index).collect();
        if order.is_empty() {
            return Err(LoadError::EmptyDocument);
        }

        Ok(Self {
            parser: Some(parser),
            order,
            per_page: options.spread.sections_per_page(options.width),
            start: 0,
        })
    }

    fn parser(&self) -> Result<&EpubParser, LoadError> {
        self.parser.as_ref().ok_or(LoadError::Disposed)
    }
}

impl Rendition for EpubRendition {
    fn display(&mut self) -> Result<Page, LoadError> {
        let parser = self.parser()?;
        let location = self.location();

        let sections = (location.start..location.end)
            .map(|position| {
                let chapter = parser.get_chapter(self.order[position])?;
                Ok::<_, LoadError>(Section {
                    index: position,
                    href: chapter.href,
                    title: chapter.title,
                    html: chapter.html,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(location, sections))
    }

    fn prev(&mut self) -> Result<Page, LoadError> {
        self.parser()?;
        self.start = self.start.saturating_sub(self.per_page);
        self.display()
    }

    fn next(&mut self) -> Result<Page, LoadError> {
        self.parser()?;
        if self.start + self.per_page < self.order.len() {
            self.start += self.per_page;
        }
        self.display()
    }

    fn location(&self) -> Location {
        Location {
            start: self.start,
            end: (self.start + self.per_page).min(self.order.len()),
            total: self.order.len(),
        }
    }

    fn resource(&self, href: &str) -> Result<Resource, LoadError> {
        Ok(self.parser()?.get_resource(href)?)
    }

    fn dispose(&mut self) {
        if self.parser.take().is_some() {
            tracing::debug!(sections = self.order.len(), "Disposed rendition");
        }
    }
}
