//! Robots.txt handling module
//!
//! This module fetches robots.txt once per origin, caches the rules for the lifetime of
//! the gate, and answers permission checks. It fails open: any problem retrieving the
//! file grants permission.

mod parser;

pub use parser::RobotsRules;

use crate::engine::RobotsWarning;
use crate::url::origin_of;
use reqwest::Client;
use std::collections::HashMap;
use tokio::sync::Mutex;
use url::Url;

/// Product token matched against `User-agent` groups
pub const ROBOTS_AGENT: &str = "sumi-extract";

/// Outcome of a robots.txt check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permission {
    Allowed,
    /// The URL is disallowed; the engine decides whether this blocks the fetch
    Warning(RobotsWarning),
}

impl Permission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Per-origin robots.txt cache and permission check
pub struct RobotsGate {
    client: Client,
    enabled: bool,
    cache: Mutex<HashMap<String, RobotsRules>>,
}

impl RobotsGate {
    /// Creates a gate using the given client for robots.txt requests
    ///
    /// With `enabled == false` every URL is allowed and nothing is fetched.
    pub fn new(client: Client, enabled: bool) -> Self {
        Self {
            client,
            enabled,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Checks whether a URL may be fetched
    ///
    /// # Arguments
    ///
    /// * `url` - The page about to be fetched
    ///
    /// # Returns
    ///
    /// `Permission::Allowed`, or a warning naming the disallowed path
    pub async fn check_permission(&self, url: &Url) -> Permission {
        if !self.enabled {
            return Permission::Allowed;
        }

        let Some(origin) = origin_of(url) else {
            return Permission::Allowed;
        };

        // The lock is held across the fetch so concurrent checks for a new origin
        // request robots.txt once.
        let mut cache = self.cache.lock().await;
        if !cache.contains_key(&origin) {
            let rules = fetch_robots(&self.client, &origin).await;
            cache.insert(origin.clone(), rules);
        }

        let allowed = cache
            .get(&origin)
            .map(|rules| rules.is_allowed(url.as_str(), ROBOTS_AGENT))
            .unwrap_or(true);
        drop(cache);

        if allowed {
            Permission::Allowed
        } else {
            let path = url.path().to_string();
            Permission::Warning(RobotsWarning {
                url: url.to_string(),
                message: format!("URL path '{}' is disallowed by robots.txt", path),
                disallowed_paths: vec![path],
            })
        }
    }

    /// Number of origins with cached rules
    pub async fn cached_origins(&self) -> usize {
        self.cache.lock().await.len()
    }
}

/// Fetches and parses robots.txt for an origin
///
/// # Arguments
///
/// * `client` - HTTP client to use
/// * `origin` - `scheme://host[:port]`
///
/// # Returns
///
/// Parsed rules; `RobotsRules::AllowAll` on any network or status failure
pub async fn fetch_robots(client: &Client, origin: &str) -> RobotsRules {
    let robots_url = format!("{}/robots.txt", origin);
    tracing::debug!("Fetching {}", robots_url);

    let response = match client.get(&robots_url).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("robots.txt unavailable for {}: {}, allowing all", origin, e);
            return RobotsRules::AllowAll;
        }
    };

    let status = response.status().as_u16();
    match response.text().await {
        Ok(body) => RobotsRules::from_response(status, &body),
        Err(e) => {
            tracing::debug!("Failed to read robots.txt for {}: {}", origin, e);
            RobotsRules::AllowAll
        }
    }
}
