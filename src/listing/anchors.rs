use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::catalog::model::SourceDescriptor;

static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a\s[^>]*?href\s*=\s*["']([^"']+)["']"#).expect("static regex")
});

/// An anchor target that looks like an image of the source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageLink {
    /// Absolute URL, resolved against the listing URL.
    pub url: String,
    /// Last path segment.
    pub filename: String,
}

/// Scan a directory listing for anchors whose target ends in one of the source's extensions.
///
/// Matching is case-insensitive; query strings and fragments are ignored for the extension test.
/// Repeated hrefs are reported once, in document order.
pub fn scan_image_links(source: &SourceDescriptor, html: &str) -> Vec<ImageLink> {
    let base = reqwest::Url::parse(&source.base_url).ok();
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for caps in HREF.captures_iter(html) {
        let href = caps[1].trim();
        let path = href.split(['?', '#']).next().unwrap_or(href);
        let Some(filename) = path.rsplit('/').next().filter(|f| !f.is_empty()) else {
            continue;
        };
        if !source.accepts_extension(filename) || !seen.insert(href.to_string()) {
            continue;
        }
        let url = match base.as_ref().and_then(|b| b.join(href).ok()) {
            Some(u) => u.to_string(),
            None => href.to_string(),
        };
        out.push(ImageLink {
            url,
            filename: filename.to_string(),
        });
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/listing/anchors.rs"]
mod tests;
