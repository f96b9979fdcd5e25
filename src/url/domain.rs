use url::Url;

/// Extracts the lowercase host of a URL
///
/// # Arguments
///
/// * `url` - The URL to extract the domain from
///
/// # Returns
///
/// * `Some(String)` - The lowercase domain/host
/// * `None` - If the URL has no host
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_extract::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the `scheme://host[:port]` key of a URL
///
/// Robots rules and same-site checks both operate at this granularity. The port is
/// included only when it differs from the scheme default.
pub fn origin_of(url: &Url) -> Option<String> {
    let host = extract_domain(url)?;
    Some(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

/// Returns true when both URLs share host and port
///
/// The scheme is not compared, so `http://a.com/x` and `https://a.com/y` count as the
/// same site, mirroring a plain network-location comparison.
pub fn same_site(a: &Url, b: &Url) -> bool {
    extract_domain(a) == extract_domain(b) && a.port() == b.port()
}
