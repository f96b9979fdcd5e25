//! Link discovery on fetched pages

use crate::extract::HtmlPage;
use crate::url::resolve_link;
use scraper::Selector;
use url::Url;

/// Resolves the links a selector points at
///
/// Each element matched by `selector` contributes its `href` attribute, resolved
/// against `base_url` and filtered by [`resolve_link`]. Elements without an `href`
/// are ignored, so selectors like `.pagination a` and `a.next` both work.
///
/// # Arguments
///
/// * `page` - The parsed page
/// * `base_url` - URL the page was fetched from
/// * `selector` - CSS selector for link elements
///
/// # Returns
///
/// Absolute URLs in document order, without repeats. An unparseable selector yields
/// no links.
pub fn resolve_links(page: &HtmlPage<'_>, base_url: &Url, selector: &str) -> Vec<Url> {
    let Ok(selector) = Selector::parse(selector) else {
        tracing::debug!("Skipping unparseable link selector");
        return Vec::new();
    };

    let mut links: Vec<Url> = Vec::new();
    for element in page.document().select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if let Some(link) = resolve_link(href, base_url) {
            if !links.contains(&link) {
                links.push(link);
            }
        }
    }

    links
}
