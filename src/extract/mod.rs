//! Field extraction
//!
//! This module turns a fetched page and a list of [`FieldRule`]s into a record:
//! - Rule definitions with ordered fallback selectors
//! - The [`PageQuery`] seam and its `scraper`-backed implementation
//! - Value sanitization
//! - Record hashing for duplicate detection

mod hash;
mod page;
mod rule;
mod sanitize;

pub use hash::{record_hash, SeenRecords};
pub use page::{HtmlPage, NodeMatch, PageQuery, XPathMatches};
pub use rule::{FieldRule, SelectorKind};
pub use sanitize::sanitize_value;

use std::collections::BTreeMap;

/// Field name to extracted value; `None` when no selector produced a value
pub type ExtractedRecord = BTreeMap<String, Option<String>>;

/// Evaluates one rule against a page
///
/// # Arguments
///
/// * `page` - The page to query
/// * `rule` - The rule whose selectors are tried in order
///
/// # Returns
///
/// The first non-empty sanitized value, or `None` if every selector missed
pub fn extract_field(page: &impl PageQuery, rule: &FieldRule) -> Option<String> {
    for selector in rule.selectors() {
        let Some(node) = page.query(selector, rule.selector_kind) else {
            continue;
        };

        let raw = match &rule.attribute {
            Some(attribute) => node.attributes.get(attribute).cloned(),
            None => Some(node.text),
        };

        if let Some(value) = raw.map(|raw| sanitize_value(&raw)) {
            if !value.is_empty() {
                return Some(value);
            }
        }
    }

    None
}

/// Evaluates every rule against a page
///
/// Every rule name appears in the result, with `None` for misses.
pub fn extract_record(page: &impl PageQuery, rules: &[FieldRule]) -> ExtractedRecord {
    rules
        .iter()
        .map(|rule| (rule.name.clone(), extract_field(page, rule)))
        .collect()
}

/// Returns true if the record has no value for any field
pub fn is_empty_record(record: &ExtractedRecord) -> bool {
    record.values().all(Option::is_none)
}

/// Collects every XPath expression the rules may evaluate
pub fn xpath_selectors(rules: &[FieldRule]) -> Vec<String> {
    let mut selectors: Vec<String> = Vec::new();
    for rule in rules.iter().filter(|r| r.selector_kind == SelectorKind::Xpath) {
        for selector in rule.selectors() {
            if !selectors.iter().any(|s| s == selector) {
                selectors.push(selector.to_string());
            }
        }
    }
    selectors
}
