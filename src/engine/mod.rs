//! Fetch engines
//!
//! A [`FetchEngine`] turns a URL and a set of field rules into a [`FetchResult`].
//! Two variants exist: [`StaticEngine`] issues plain HTTP requests and
//! [`BrowserEngine`] renders pages in headless Chrome. Both share the pipeline in
//! [`pipeline`]: robots gating, rate limiting, retries, proxy rotation, extraction and
//! duplicate detection.

pub mod browser;
pub mod pipeline;
pub mod rate_limit;
pub mod result;
pub mod static_engine;

pub use browser::BrowserEngine;
pub use rate_limit::RateLimiter;
pub use result::{ErrorKind, FetchError, FetchResult, ProbeResult, RobotsWarning};
pub use static_engine::StaticEngine;

use crate::config::{Config, SiteType};
use crate::crawler::RunControl;
use crate::extract::{FieldRule, SelectorKind};
use crate::proxy::ProxyPool;
use crate::Result;
use async_trait::async_trait;
use futures::FutureExt;
use rand::seq::SliceRandom;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Browser user agents rotated across requests
pub const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

pub const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";

/// Picks a user agent at random
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Fetches pages and extracts records from them
#[async_trait]
pub trait FetchEngine: Send + Sync {
    /// Short variant name, `static` or `browser`
    fn name(&self) -> &'static str;

    /// Fetches one URL and applies the rules
    ///
    /// Never fails outright: every outcome, including cancellation, is described by
    /// the returned result.
    async fn scrape(&self, url: &str, rules: &[FieldRule]) -> FetchResult;

    /// Fetches several URLs concurrently
    ///
    /// # Returns
    ///
    /// One result per input URL, in input order. A scrape that panics is reported as
    /// an internal failure for its URL rather than aborting the batch.
    async fn scrape_batch(&self, urls: &[String], rules: &[FieldRule]) -> Vec<FetchResult> {
        let scrapes = urls.iter().map(|url| async move {
            match AssertUnwindSafe(self.scrape(url, rules)).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    tracing::error!("Scrape of {} panicked", url);
                    FetchResult::failure(
                        url.as_str(),
                        FetchError::new(ErrorKind::Internal, "Scrape task panicked"),
                    )
                }
            }
        });
        futures::future::join_all(scrapes).await
    }

    /// Checks robots.txt without fetching the page
    ///
    /// # Returns
    ///
    /// `Some(warning)` if the URL is disallowed, `None` otherwise
    async fn check_robots(&self, url: &str) -> Option<RobotsWarning>;

    /// Loads a page and reports how many elements a selector matches
    async fn probe_selector(&self, url: &str, selector: &str, kind: SelectorKind) -> ProbeResult;

    /// The proxy pool this engine draws from
    fn proxy_pool(&self) -> Arc<ProxyPool>;

    /// Releases connections and browser processes
    async fn close(&self);
}

/// Builds the engine variant the configuration asks for
///
/// `auto` and `static` select plain HTTP; `browser` selects headless Chrome.
pub fn build_engine(config: &Config, control: Arc<RunControl>) -> Result<Arc<dyn FetchEngine>> {
    let engine: Arc<dyn FetchEngine> = match config.target.site_type {
        SiteType::Auto | SiteType::Static => Arc::new(StaticEngine::from_config(config, control)?),
        SiteType::Browser => Arc::new(BrowserEngine::from_config(config, control)?),
    };
    tracing::info!("Using {} engine", engine.name());
    Ok(engine)
}
