//! Rendering capability
//!
//! The reader page only ever talks to these traits. The engine owns layout
//! and position; callers ask for the current, previous or next page and
//! never keep a page index of their own.

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::epub::Resource;
use crate::error::LoadError;

/// Viewport width from which `Spread::Auto` shows two sections side by side
pub const AUTO_SPREAD_MIN_WIDTH: u32 = 800;

/// How many sections a page shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Spread {
    /// Always one section
    None,
    /// Always two sections
    Always,
    /// Two sections on wide viewports, one otherwise
    #[default]
    Auto,
}

impl Spread {
    pub fn sections_per_page(self, viewport_width: u32) -> usize {
        match self {
            Self::None => 1,
            Self::Always => 2,
            Self::Auto if viewport_width >= AUTO_SPREAD_MIN_WIDTH => 2,
            Self::Auto => 1,
        }
    }
}

/// Viewport the rendition lays out into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub spread: Spread,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            spread: Spread::Auto,
        }
    }
}

/// A page turn request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTurn {
    Prev,
    Next,
}

impl FromStr for PageTurn {
    type Err = String;

    /// On-screen buttons send `prev`/`next`; key listeners send the
    /// `KeyboardEvent.key` value. Both map to the same turn.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "prev" | "ArrowLeft" => Ok(Self::Prev),
            "next" | "ArrowRight" => Ok(Self::Next),
            other => Err(format!("Unknown reader input: {}", other)),
        }
    }
}

/// Position of the displayed page within the reading order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Location {
    /// First displayed section
    pub start: usize,
    /// One past the last displayed section
    pub end: usize,
    /// Sections in the reading order
    pub total: usize,
}

impl Location {
    pub fn at_start(&self) -> bool {
        self.start == 0
    }

    pub fn at_end(&self) -> bool {
        self.end >= self.total
    }
}

/// One displayed section of the document
#[derive(Debug, Clone, Serialize)]
pub struct Section {
    /// Position in the reading order
    pub index: usize,
    pub href: String,
    pub title: Option<String>,
    pub html: String,
}

/// What the viewport shows after a display or page turn
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub location: Location,
    pub sections: Vec<Section>,
    pub at_start: bool,
    pub at_end: bool,
}

impl Page {
    pub fn new(location: Location, sections: Vec<Section>) -> Self {
        Self {
            at_start: location.at_start(),
            at_end: location.at_end(),
            location,
            sections,
        }
    }
}

/// A document laid out into a viewport
pub trait Rendition: Send + Sync {
    /// Render the current location
    fn display(&mut self) -> Result<Page, LoadError>;

    /// Step back one page; a no-op on the first page
    fn prev(&mut self) -> Result<Page, LoadError>;

    /// Step forward one page; a no-op on the last page
    fn next(&mut self) -> Result<Page, LoadError>;

    fn location(&self) -> Location;

    /// A resource referenced by the displayed sections (archive path)
    fn resource(&self, href: &str) -> Result<Resource, LoadError>;

    /// Release everything the rendition holds. Further calls fail.
    fn dispose(&mut self);

    fn turn(&mut self, turn: PageTurn) -> Result<Page, LoadError> {
        match turn {
            PageTurn::Prev => self.prev(),
            PageTurn::Next => self.next(),
        }
    }
}

/// Creates renditions from document URLs
#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn load(&self, url: &str, options: RenderOptions) -> Result<Box<dyn Rendition>, LoadError>;
}
