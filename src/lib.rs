//! Sumi-Extract: selector-driven page extraction with polite crawling
//!
//! This crate turns a list of seed URLs and a set of field rules into a stream of
//! extraction results, respecting robots.txt, rate limits and proxy health, with an
//! interactive pause/skip/stop protocol for failures that need a human decision.

pub mod config;
pub mod crawler;
pub mod engine;
pub mod extract;
pub mod output;
pub mod proxy;
pub mod robots;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Extract operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Nothing to scrape: {0}")]
    NoUrlsOrNoFields(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: crawler::RunState,
        to: crawler::RunState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading a project file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read project file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed project TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("URL check failed: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector for field '{field}': {selector}")]
    InvalidSelector { field: String, selector: String },
}

/// Errors from URL parsing and pattern expansion
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL pattern: {0}")]
    Pattern(String),
}

/// Result type alias for Sumi-Extract operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Shorthand for project-file results
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Shorthand for URL helper results
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Crate-level re-exports
pub use config::Config;
pub use crawler::{Event, Orchestrator, RunHandle, RunState};
pub use engine::{build_engine, ErrorKind, FetchEngine, FetchResult};
pub use extract::{FieldRule, SelectorKind};
pub use proxy::ProxyPool;
