//! Section preparation for the reader viewport
//!
//! Sections are shown in sandboxed frames on the reader page, so every
//! reference into the book has to become a URL the server can answer.
//! Scripts and inline event handlers are dropped on the way.

use lol_html::errors::AttributeNameError;
use lol_html::html_content::Element;
use lol_html::{element, rewrite_str, RewriteStrSettings};

use crate::epub::path;

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("HTML rewrite failed: {0}")]
    Rewrite(String),
}

/// `/reader/views/{view}/resources`
pub fn resource_prefix(view: uuid::Uuid) -> String {
    format!("/reader/views/{}/resources", view)
}

/// URL under `prefix` for an archive path, one encoded segment at a time
pub fn resource_url(prefix: &str, archive_path: &str) -> String {
    let encoded: Vec<String> = archive_path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("{}/{}", prefix, encoded.join("/"))
}

/// Rewrite book-relative references in `html` (a section stored at
/// `section_href`) to point below `prefix`, and strip active content
pub fn rewrite_section(html: &str, section_href: &str, prefix: &str) -> Result<String, RewriteError> {
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("script", |el| {
                    el.remove();
                    Ok(())
                }),
                element!("img[src]", |el| {
                    relink(el, "src", section_href, prefix)?;
                    Ok(())
                }),
                // SVG covers reference their bitmap through href or xlink:href
                element!("image", |el| {
                    relink(el, "href", section_href, prefix)?;
                    relink(el, "xlink:href", section_href, prefix)?;
                    Ok(())
                }),
                element!("link[href]", |el| {
                    relink(el, "href", section_href, prefix)?;
                    Ok(())
                }),
                element!("*", |el| {
                    let handlers: Vec<String> = el
                        .attributes()
                        .iter()
                        .map(|attr| attr.name())
                        .filter(|name| name.starts_with("on"))
                        .collect();
                    for name in handlers {
                        el.remove_attribute(&name);
                    }
                    if let Some(href) = el.get_attribute("href") {
                        if href.trim().to_lowercase().starts_with("javascript:") {
                            el.remove_attribute("href");
                        }
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| RewriteError::Rewrite(e.to_string()))
}

fn relink(
    el: &mut Element,
    attribute: &str,
    section_href: &str,
    prefix: &str,
) -> Result<(), AttributeNameError> {
    if let Some(value) = el.get_attribute(attribute) {
        if let Some(resolved) = path::resolve(section_href, &value) {
            el.set_attribute(attribute, &resource_url(prefix, &resolved))?;
        }
    }
    Ok(())
}
