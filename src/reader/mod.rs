//! Reader module
//!
//! The rendering engine behind the reader page and the registry that ties
//! each rendition to the page view that asked for it.

mod engine;
mod rendition;
mod session;

pub use engine::{parse_document_url, EpubEngine, EpubRendition};
pub use rendition::{
    Location, Page, PageTurn, RenderEngine, RenderOptions, Rendition, Section, Spread,
    AUTO_SPREAD_MIN_WIDTH,
};
pub use session::{LoadTicket, ViewRegistry};
