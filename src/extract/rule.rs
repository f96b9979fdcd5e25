use serde::{Deserialize, Serialize};

/// Query language a selector is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    #[default]
    Css,
    Xpath,
}

/// A named extraction rule
///
/// The primary selector is tried first, then each fallback in order; the first one
/// that yields a non-empty value after sanitization wins.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldRule {
    pub name: String,

    pub selector: String,

    #[serde(rename = "selector-kind", default)]
    pub selector_kind: SelectorKind,

    #[serde(rename = "fallback-selectors", default)]
    pub fallback_selectors: Vec<String>,

    /// Attribute to read instead of the text content (`href`, `src`, ...)
    #[serde(default)]
    pub attribute: Option<String>,
}

impl FieldRule {
    /// Creates a CSS rule reading the element's text
    pub fn css(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            selector_kind: SelectorKind::Css,
            fallback_selectors: Vec::new(),
            attribute: None,
        }
    }

    /// Creates an XPath rule reading the element's text
    pub fn xpath(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            selector_kind: SelectorKind::Xpath,
            ..Self::css(name, selector)
        }
    }

    pub fn with_fallbacks<I, S>(mut self, fallbacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_selectors = fallbacks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Primary selector followed by the fallbacks, in evaluation order
    pub fn selectors(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.selector.as_str())
            .chain(self.fallback_selectors.iter().map(String::as_str))
    }
}
