use super::SelectorKind;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One element matched by a selector
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct NodeMatch {
    /// Concatenated text content, trimmed
    pub text: String,

    /// Lowercase tag name
    pub tag: String,

    pub attributes: BTreeMap<String, String>,
}

/// XPath results evaluated ahead of time, keyed by expression
pub type XPathMatches = HashMap<String, Vec<NodeMatch>>;

/// Read-only view of a fetched page that field rules are evaluated against
pub trait PageQuery {
    /// Returns up to `limit` matches in document order
    fn query_all(&self, selector: &str, kind: SelectorKind, limit: usize) -> Vec<NodeMatch>;

    /// Returns the first match, if any
    fn query(&self, selector: &str, kind: SelectorKind) -> Option<NodeMatch> {
        self.query_all(selector, kind, 1).into_iter().next()
    }
}

/// A parsed HTML document
///
/// CSS selectors run directly against the parsed tree. `scraper` has no XPath
/// support, so XPath selectors are answered from matches the loader evaluated inside
/// the browser; without them every XPath query is a miss.
pub struct HtmlPage<'a> {
    document: Html,
    xpath_matches: Option<&'a XPathMatches>,
}

impl<'a> HtmlPage<'a> {
    pub fn parse(html: &str) -> Self {
        Self {
            document: Html::parse_document(html),
            xpath_matches: None,
        }
    }

    pub fn with_xpath_matches(mut self, matches: &'a XPathMatches) -> Self {
        self.xpath_matches = Some(matches);
        self
    }

    /// Gives link extraction direct access to the parsed tree
    pub fn document(&self) -> &Html {
        &self.document
    }
}

impl PageQuery for HtmlPage<'_> {
    fn query_all(&self, selector: &str, kind: SelectorKind, limit: usize) -> Vec<NodeMatch> {
        match kind {
            SelectorKind::Css => {
                let Ok(parsed) = Selector::parse(selector) else {
                    tracing::debug!("Ignoring unparseable CSS selector: {}", selector);
                    return Vec::new();
                };
                self.document
                    .select(&parsed)
                    .take(limit)
                    .map(node_from_element)
                    .collect()
            }
            SelectorKind::Xpath => self
                .xpath_matches
                .and_then(|matches| matches.get(selector))
                .map(|nodes| nodes.iter().take(limit).cloned().collect())
                .unwrap_or_default(),
        }
    }
}

fn node_from_element(element: ElementRef<'_>) -> NodeMatch {
    NodeMatch {
        text: element.text().collect::<String>().trim().to_string(),
        tag: element.value().name().to_string(),
        attributes: element
            .value()
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}
