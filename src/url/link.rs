use url::Url;

/// Suffixes of resources that are never worth queueing as pages
const SKIPPED_SUFFIXES: &[&str] = &[".pdf", ".jpg", ".png", ".gif", ".css", ".js"];

/// Resolves an `href` against the page it was found on and filters it for crawling
///
/// # Exclusion Rules
///
/// - Empty hrefs and hrefs that fail to resolve
/// - Any scheme other than `http`/`https` after resolution (`mailto:`, `javascript:`, ...)
/// - URLs carrying a fragment (in-page anchors)
/// - URLs ending in a static-asset suffix (`.pdf .jpg .png .gif .css .js`)
///
/// # Arguments
///
/// * `href` - Raw attribute value
/// * `base_url` - URL of the page containing the link
///
/// # Returns
///
/// The absolute URL, or `None` if the link should not be followed
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_extract::url::resolve_link;
///
/// let base = Url::parse("https://example.com/list/").unwrap();
/// let link = resolve_link("item?id=2", &base).unwrap();
/// assert_eq!(link.as_str(), "https://example.com/list/item?id=2");
/// assert!(resolve_link("/brochure.pdf", &base).is_none());
/// ```
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    let resolved = base_url.join(href).ok()?;

    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }

    if resolved.fragment().is_some() {
        return None;
    }

    let lowered = resolved.as_str().to_ascii_lowercase();
    if SKIPPED_SUFFIXES.iter().any(|suffix| lowered.ends_with(suffix)) {
        return None;
    }

    Some(resolved)
}
