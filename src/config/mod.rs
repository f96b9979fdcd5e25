//! Configuration module for Sumi-Extract
//!
//! This module handles loading, parsing, and validating TOML project files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_extract::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("project.toml")).unwrap();
//! println!("Extracting {} fields", config.fields.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AuthConfig, BrowserConfig, Config, CrawlConfig, OptionsConfig, PauseOn, ProxyConfig,
    RateLimitConfig, SettleCondition, SiteType, TargetConfig,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, parse_url_list, resolve_seed_urls,
};
pub use validation::validate;
