/// Characters that render as nothing but break equality and hashing
const ZERO_WIDTH: &[char] = &['\u{200b}', '\u{200c}', '\u{200d}', '\u{feff}'];

/// Cleans a raw extracted value
///
/// - `mailto:` and `tel:` prefixes are stripped (case-insensitive)
/// - `javascript:` values become the empty string
/// - Runs of whitespace collapse to a single space and the ends are trimmed
/// - Zero-width characters are removed
///
/// # Examples
///
/// ```
/// use sumi_extract::extract::sanitize_value;
///
/// assert_eq!(sanitize_value("mailto:a@b.com"), "a@b.com");
/// assert_eq!(sanitize_value("  Hello \n\t world "), "Hello world");
/// assert_eq!(sanitize_value("javascript:void(0)"), "");
/// ```
pub fn sanitize_value(raw: &str) -> String {
    let mut value = raw;

    if has_prefix_ignore_case(value, "mailto:") {
        value = &value["mailto:".len()..];
    }
    if has_prefix_ignore_case(value, "tel:") {
        value = &value["tel:".len()..];
    }
    if has_prefix_ignore_case(value, "javascript:") {
        return String::new();
    }

    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !ZERO_WIDTH.contains(c))
        .collect()
}

fn has_prefix_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}
