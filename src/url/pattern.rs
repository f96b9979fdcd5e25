use crate::{UrlError, UrlResult};

/// Upper bound on the number of URLs a single pattern may produce
const MAX_EXPANSION: u64 = 10_000;

/// Expands a numeric range placeholder in a URL template
///
/// The first `{start-end}` group is replaced by every integer in the inclusive range.
/// A start value written with leading zeros (`{01-12}`) pads every number to the same
/// width. Templates without a placeholder are returned unchanged as a single URL.
///
/// # Arguments
///
/// * `pattern` - Template such as `https://example.com/page/{1-10}`
///
/// # Returns
///
/// * `Ok(Vec<String>)` - Expanded URLs in ascending order
/// * `Err(UrlError::Pattern)` - Unbalanced braces, non-numeric bounds, or start > end
///
/// # Examples
///
/// ```
/// use sumi_extract::url::expand_url_pattern;
///
/// let urls = expand_url_pattern("https://example.com/p/{1-3}").unwrap();
/// assert_eq!(urls.len(), 3);
/// assert_eq!(urls[2], "https://example.com/p/3");
/// ```
pub fn expand_url_pattern(pattern: &str) -> UrlResult<Vec<String>> {
    let Some(open) = pattern.find('{') else {
        return Ok(vec![pattern.to_string()]);
    };
    let close = pattern[open..]
        .find('}')
        .map(|offset| open + offset)
        .ok_or_else(|| UrlError::Pattern(format!("unclosed '{{' in {}", pattern)))?;

    let range = &pattern[open + 1..close];
    let (start_str, end_str) = range
        .split_once('-')
        .ok_or_else(|| UrlError::Pattern(format!("expected {{start-end}}, got {{{}}}", range)))?;

    let start: u64 = start_str
        .trim()
        .parse()
        .map_err(|_| UrlError::Pattern(format!("invalid range start '{}'", start_str)))?;
    let end: u64 = end_str
        .trim()
        .parse()
        .map_err(|_| UrlError::Pattern(format!("invalid range end '{}'", end_str)))?;

    if start > end {
        return Err(UrlError::Pattern(format!(
            "range start {} is greater than end {}",
            start, end
        )));
    }
    if end - start >= MAX_EXPANSION {
        return Err(UrlError::Pattern(format!(
            "range {{{}}} expands to more than {} URLs",
            range, MAX_EXPANSION
        )));
    }

    let start_str = start_str.trim();
    let width = if start_str.len() > 1 && start_str.starts_with('0') {
        start_str.len()
    } else {
        0
    };

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];

    Ok((start..=end)
        .map(|n| format!("{}{:0width$}{}", prefix, n, suffix, width = width))
        .collect())
}
