//! URL handling module for Sumi-Extract
//!
//! This module provides:
//! - Domain and origin extraction used by robots caching and same-site checks
//! - Link resolution and filtering for the crawl frontier
//! - Numeric range expansion for seed URL templates

mod domain;
mod link;
mod pattern;

pub use domain::{extract_domain, origin_of, same_site};
pub use link::resolve_link;
pub use pattern::expand_url_pattern;

use crate::{UrlError, UrlResult};
use url::Url;

/// Parses a seed URL and checks that it is fetchable
///
/// # Arguments
///
/// * `url_str` - The URL string to validate
///
/// # Returns
///
/// * `Ok(Url)` - Parsed absolute HTTP(S) URL
/// * `Err(UrlError)` - Malformed, non-HTTP(S), or host-less URL
pub fn parse_http_url(url_str: &str) -> UrlResult<Url> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    Ok(url)
}
