use crate::config::types::Config;
use crate::config::validation::validate;
use crate::url::expand_url_pattern;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

/// Reads a project file, resolves its seed URLs and validates the result
///
/// Seed URLs from `url-pattern` and `urls-file` are merged into `target.urls`
/// (deduplicated, original order kept) before validation. A relative `urls-file` is
/// resolved against the configuration file's directory.
///
/// # Arguments
///
/// * `path` - Location of the TOML project file
///
/// # Returns
///
/// * `Ok(Config)` - Project ready to run
/// * `Err(ConfigError)` - Unreadable file, bad TOML or a failed check
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_extract::config::load_config;
///
/// let config = load_config(Path::new("project.toml")).unwrap();
/// println!("{} seed URLs", config.target.urls.len());
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    resolve_seed_urls(&mut config, base_dir)?;

    validate(&config)?;

    Ok(config)
}

/// Merges pattern and file URLs into `target.urls`
///
/// # Arguments
///
/// * `config` - Configuration to update in place
/// * `base_dir` - Directory a relative `urls-file` is resolved against
///
/// # Returns
///
/// * `Ok(())` - URLs merged
/// * `Err(ConfigError)` - Malformed pattern or unreadable file
pub fn resolve_seed_urls(config: &mut Config, base_dir: &Path) -> Result<(), ConfigError> {
    let mut urls: Vec<String> = config.target.urls.clone();

    if let Some(pattern) = &config.target.url_pattern {
        let expanded = expand_url_pattern(pattern)
            .map_err(|e| ConfigError::Validation(format!("url-pattern: {}", e)))?;
        urls.extend(expanded);
    }

    if let Some(file) = &config.target.urls_file {
        let file_path = base_dir.join(file);
        let content = std::fs::read_to_string(&file_path)?;
        urls.extend(parse_url_list(&content));
    }

    let mut seen = HashSet::new();
    config.target.urls = urls
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty() && seen.insert(u.clone()))
        .collect();

    Ok(())
}

/// Parses a URL list: one URL per line, blank lines and `#` comments skipped
pub fn parse_url_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Fingerprints the raw project file with SHA-256
///
/// Printed with the run plan so two runs can be tied to the same project file.
///
/// # Arguments
///
/// * `path` - Location of the TOML project file
///
/// # Returns
///
/// * `Ok(String)` - Lowercase hex digest
/// * `Err(ConfigError)` - The file could not be read
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// `load_config` plus the file fingerprint
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
