//! Archive path resolution
//!
//! EPUB hrefs are relative to the document that contains them and may be
//! percent-encoded. Everything inside the parser and the viewport rewriter
//! works with normalized archive paths instead.

/// Directory part of an archive path (`OEBPS/text/ch1.xhtml` -> `OEBPS/text`)
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolve `href` against the archive file `base`.
///
/// Returns `None` for references that do not point into the archive:
/// absolute URLs, `data:` URIs, protocol-relative and fragment-only links.
pub fn resolve(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("//") || has_scheme(href) {
        return None;
    }

    let without_fragment = href.split(['#', '?']).next().unwrap_or(href);
    let decoded = urlencoding::decode(without_fragment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| without_fragment.to_string());

    let joined = if let Some(rooted) = decoded.strip_prefix('/') {
        rooted.to_string()
    } else {
        let dir = parent_dir(base);
        if dir.is_empty() {
            decoded
        } else {
            format!("{}/{}", dir, decoded)
        }
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

fn has_scheme(href: &str) -> bool {
    match href.split_once(':') {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}
