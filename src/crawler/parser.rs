//! HTML parser for extracting links
//!
//! This module handles parsing HTML content to extract candidate links from a
//! fixed allow-list of tag/attribute pairs, and turning those candidates into
//! canonical same-site URLs.

use crate::url::{canonicalize_with_base, is_same_site};
use scraper::Html;
use url::Url;

/// Tags whose attribute may hold a link to a text document, and that attribute
pub const LINK_ATTRIBUTES: &[(&str, &str)] = &[
    ("a", "href"),
    ("blockquote", "cite"),
    ("iframe", "src"),
    ("link", "href"),
    ("script", "src"),
];

fn link_attribute(tag: &str) -> Option<&'static str> {
    LINK_ATTRIBUTES
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, attr)| *attr)
}

/// Extracts raw link values from an HTML document, in document order
///
/// # Extraction Rules
///
/// | Tag | Attribute |
/// |-----|-----------|
/// | `a` | `href` |
/// | `blockquote` | `cite` |
/// | `iframe` | `src` |
/// | `link` | `href` |
/// | `script` | `src` |
///
/// Only the first matching attribute of an element is taken. Values are
/// returned as written; resolving and filtering is [`resolve_same_site`]'s job.
/// The tree is walked with an explicit stack, so arbitrarily deep markup
/// cannot exhaust the call stack.
///
/// # Example
///
/// ```
/// use site_mirror::crawler::extract_links;
///
/// let html = r#"<a href="/a">A</a><script src="app.js"></script><img src="x.png">"#;
/// assert_eq!(extract_links(html), vec!["/a", "app.js"]);
/// ```
pub fn extract_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    let mut stack = vec![document.tree.root()];
    while let Some(node) = stack.pop() {
        if let Some(element) = node.value().as_element() {
            if let Some(wanted) = link_attribute(element.name()) {
                if let Some((_, value)) = element.attrs().find(|(name, _)| *name == wanted) {
                    links.push(value.to_string());
                }
            }
        }

        // Reversed so the leftmost child is popped first
        stack.extend(node.children().rev());
    }

    links
}

/// Resolves raw links against `base` and keeps the canonical same-site ones
///
/// Links that fail to parse, use a scheme other than http(s), or belong to
/// another domain key are dropped. Order is preserved; duplicates are left
/// for the task store to reject.
pub fn resolve_same_site(raw_links: &[String], base: &Url, target_domain: &str) -> Vec<Url> {
    raw_links
        .iter()
        .filter_map(|raw| {
            let raw = raw.trim();
            if raw.is_empty() || raw.starts_with('#') {
                return None;
            }
            match canonicalize_with_base(raw, base) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::trace!(link = raw, error = %e, "skipping link");
                    None
                }
            }
        })
        .filter(|url| is_same_site(url, target_domain))
        .collect()
}
