//! Fetch pipeline shared by both engine variants
//!
//! [`Engine`] owns everything that is the same for plain HTTP and rendered pages:
//! robots gating, the concurrency slots, rate limiting, retries with back-off, proxy
//! reporting, extraction and duplicate detection. A [`PageLoader`] supplies the one
//! step that differs, turning a URL into markup.

use super::rate_limit::{retry_backoff, RateLimiter};
use super::result::{ErrorKind, FetchError, FetchResult, ProbeResult, RobotsWarning};
use super::FetchEngine;
use crate::config::Config;
use crate::crawler::RunControl;
use crate::extract::{
    extract_record, is_empty_record, xpath_selectors, FieldRule, HtmlPage, PageQuery,
    SeenRecords, SelectorKind, XPathMatches,
};
use crate::proxy::ProxyPool;
use crate::robots::{Permission, RobotsGate};
use crate::url::parse_http_url;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use url::Url;

/// Markup produced by one successful load
#[derive(Debug, Clone, Default)]
pub struct LoadedPage {
    pub status: u16,
    pub html: String,
    /// Results of XPath expressions evaluated while the page was live
    pub xpath_matches: XPathMatches,
}

/// Turns a URL into markup; one call is one attempt
#[async_trait]
pub trait PageLoader: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether a robots.txt denial blocks the fetch or only warns
    fn enforces_robots(&self) -> bool;

    /// Whether successful results carry the page markup
    fn retains_html(&self) -> bool;

    /// Loads a page once, through `proxy` if given
    ///
    /// `xpaths` lists the XPath expressions the caller will query; loaders that
    /// cannot evaluate XPath leave `xpath_matches` empty.
    async fn load(
        &self,
        url: &Url,
        proxy: Option<&str>,
        xpaths: &[String],
    ) -> Result<LoadedPage, FetchError>;

    /// Releases loader resources
    async fn close(&self);
}

/// Per-engine options, taken from the run configuration
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub retry_count: u32,
    pub retry_backoff: Duration,
    pub detect_duplicates: bool,
    pub save_html_on_error: bool,
    pub max_concurrent: usize,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry_count: config.options.retry_count,
            retry_backoff: config.options.retry_backoff(),
            detect_duplicates: config.options.detect_duplicates,
            save_html_on_error: config.options.save_html_on_error,
            max_concurrent: config.rate_limit.max_concurrent.max(1) as usize,
        }
    }
}

/// Builds the rate limiter described by the configuration
pub fn rate_limiter_from_config(config: &Config) -> RateLimiter {
    RateLimiter::new(
        Duration::from_secs_f64(config.rate_limit.min_delay.max(0.0)),
        Duration::from_secs_f64(config.rate_limit.max_delay.max(0.0)),
        config.rate_limit.adaptive,
    )
}

/// Builds the proxy pool described by the configuration
pub fn proxy_pool_from_config(config: &Config) -> ProxyPool {
    ProxyPool::new(config.proxy.proxies.iter().cloned())
        .with_rotation(config.proxy.rotate)
        .with_failure_threshold(config.proxy.failure_threshold)
}

/// A fetch engine: shared pipeline plus a loader
pub struct Engine<L: PageLoader> {
    loader: L,
    settings: EngineSettings,
    robots: RobotsGate,
    limiter: RateLimiter,
    proxies: Arc<ProxyPool>,
    slots: Semaphore,
    consecutive_errors: AtomicU32,
    seen: SeenRecords,
    control: Arc<RunControl>,
}

impl<L: PageLoader> Engine<L> {
    pub fn new(
        loader: L,
        settings: EngineSettings,
        robots: RobotsGate,
        limiter: RateLimiter,
        proxies: Arc<ProxyPool>,
        control: Arc<RunControl>,
    ) -> Self {
        let slots = Semaphore::new(settings.max_concurrent.max(1));
        Self {
            loader,
            settings,
            robots,
            limiter,
            proxies,
            slots,
            consecutive_errors: AtomicU32::new(0),
            seen: SeenRecords::new(),
            control,
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Current length of the failure streak driving adaptive delays
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::SeqCst)
    }

    /// Sleeps unless a stop arrives first; returns false if stopped
    async fn pause_for(&self, duration: Duration) -> bool {
        if self.control.is_stop_requested() {
            return false;
        }
        if duration.is_zero() {
            return true;
        }
        tokio::select! {
            _ = self.control.stopped() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn cancelled(url: &str, started: Instant) -> FetchResult {
        FetchResult::failure(url, FetchError::new(ErrorKind::Cancelled, "Stopped"))
            .with_elapsed(elapsed_ms(started))
    }

    /// Runs rules against the loaded page and applies the success annotations
    ///
    /// Kept synchronous: the parsed document is not `Send`.
    fn complete(&self, url: &str, page: LoadedPage, rules: &[FieldRule]) -> FetchResult {
        let record = {
            let view = HtmlPage::parse(&page.html).with_xpath_matches(&page.xpath_matches);
            extract_record(&view, rules)
        };

        let mut result = FetchResult::success(url, record, page.status);
        let record = result.extracted_data.as_ref();

        if !rules.is_empty() && record.map(is_empty_record).unwrap_or(true) {
            tracing::debug!("No fields matched on {}", url);
            result.error_kind = Some(ErrorKind::NoFieldsMatched);
            result.error = Some("No fields matched".to_string());
        } else if self.settings.detect_duplicates
            && record.map(|r| self.seen.check_and_insert(r)).unwrap_or(false)
        {
            tracing::debug!("Duplicate record on {}", url);
            result.error_kind = Some(ErrorKind::DuplicateContent);
            result.error = Some("Duplicate detected".to_string());
        }

        if self.loader.retains_html() {
            result.raw_html = Some(page.html);
        }
        result
    }

    fn probe_page(url: &str, selector: &str, kind: SelectorKind, page: &LoadedPage) -> ProbeResult {
        let view = HtmlPage::parse(&page.html).with_xpath_matches(&page.xpath_matches);
        let matches = view.query_all(selector, kind, usize::MAX);
        ProbeResult {
            url: url.to_string(),
            selector: selector.to_string(),
            count: matches.len(),
            samples: matches.into_iter().take(ProbeResult::MAX_SAMPLES).collect(),
            error: None,
        }
    }
}

#[async_trait]
impl<L: PageLoader> FetchEngine for Engine<L> {
    fn name(&self) -> &'static str {
        self.loader.name()
    }

    async fn scrape(&self, url: &str, rules: &[FieldRule]) -> FetchResult {
        let started = Instant::now();

        let parsed = match parse_http_url(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                return FetchResult::failure(url, FetchError::new(ErrorKind::Internal, e.to_string()))
                    .with_elapsed(elapsed_ms(started));
            }
        };

        if let Permission::Warning(warning) = self.robots.check_permission(&parsed).await {
            if self.loader.enforces_robots() {
                tracing::info!("Blocked by robots.txt: {}", url);
                return FetchResult::failure(
                    url,
                    FetchError::new(
                        ErrorKind::RobotsBlocked,
                        format!("Blocked by robots.txt: {}", warning.message),
                    ),
                )
                .with_elapsed(elapsed_ms(started));
            }
        }

        let _slot = match self.slots.acquire().await {
            Ok(slot) => slot,
            Err(_) => return Self::cancelled(url, started),
        };

        let delay = self.limiter.delay(self.consecutive_errors());
        if !self.pause_for(delay).await {
            return Self::cancelled(url, started);
        }

        let xpaths = xpath_selectors(rules);
        let mut last_error: Option<FetchError> = None;

        for attempt in 0..=self.settings.retry_count {
            if self.control.is_stop_requested() {
                return Self::cancelled(url, started);
            }

            let proxy = self.proxies.next();
            tracing::debug!(
                "Fetching {} (attempt {}/{}, proxy: {})",
                url,
                attempt + 1,
                self.settings.retry_count + 1,
                proxy.as_deref().unwrap_or("direct")
            );

            let outcome = tokio::select! {
                biased;
                _ = self.control.stopped() => return Self::cancelled(url, started),
                outcome = self.loader.load(&parsed, proxy.as_deref(), &xpaths) => outcome,
            };

            match outcome {
                Ok(page) => {
                    if let Some(proxy) = &proxy {
                        self.proxies.report_success(proxy);
                    }
                    self.consecutive_errors.store(0, Ordering::SeqCst);
                    return self
                        .complete(url, page, rules)
                        .with_elapsed(elapsed_ms(started));
                }
                Err(error) => {
                    if let Some(proxy) = &proxy {
                        self.proxies.report_failure(proxy, &error.message);
                    }
                    self.consecutive_errors.fetch_add(1, Ordering::SeqCst);
                    tracing::debug!("Attempt {} for {} failed: {}", attempt + 1, url, error);
                    last_error = Some(error);
                }
            }

            if attempt < self.settings.retry_count {
                let backoff = retry_backoff(self.settings.retry_backoff, attempt);
                if !self.pause_for(backoff).await {
                    return Self::cancelled(url, started);
                }
            }
        }

        let mut error = last_error
            .unwrap_or_else(|| FetchError::new(ErrorKind::Internal, "No attempt was made"));
        if !self.settings.save_html_on_error {
            error.html = None;
        }
        tracing::warn!("Giving up on {}: {}", url, error.message);

        FetchResult::failure(url, error).with_elapsed(elapsed_ms(started))
    }

    async fn check_robots(&self, url: &str) -> Option<RobotsWarning> {
        let parsed = parse_http_url(url).ok()?;
        match self.robots.check_permission(&parsed).await {
            Permission::Allowed => None,
            Permission::Warning(warning) => Some(warning),
        }
    }

    async fn probe_selector(&self, url: &str, selector: &str, kind: SelectorKind) -> ProbeResult {
        let failed = |message: String| ProbeResult {
            url: url.to_string(),
            selector: selector.to_string(),
            error: Some(message),
            ..ProbeResult::default()
        };

        let parsed = match parse_http_url(url) {
            Ok(parsed) => parsed,
            Err(e) => return failed(e.to_string()),
        };

        if let Permission::Warning(warning) = self.robots.check_permission(&parsed).await {
            if self.loader.enforces_robots() {
                return failed(format!("Blocked by robots.txt: {}", warning.message));
            }
        }

        let _slot = match self.slots.acquire().await {
            Ok(slot) => slot,
            Err(_) => return failed("Stopped".to_string()),
        };
        if self.control.is_stop_requested() {
            return failed("Stopped".to_string());
        }

        let xpaths = match kind {
            SelectorKind::Xpath => vec![selector.to_string()],
            SelectorKind::Css => Vec::new(),
        };
        let proxy = self.proxies.next();

        let outcome = tokio::select! {
            biased;
            _ = self.control.stopped() => return failed("Stopped".to_string()),
            outcome = self.loader.load(&parsed, proxy.as_deref(), &xpaths) => outcome,
        };

        match outcome {
            Ok(page) => {
                if let Some(proxy) = &proxy {
                    self.proxies.report_success(proxy);
                }
                Self::probe_page(url, selector, kind, &page)
            }
            Err(e) => {
                if let Some(proxy) = &proxy {
                    self.proxies.report_failure(proxy, &e.message);
                }
                failed(e.message)
            }
        }
    }

    fn proxy_pool(&self) -> Arc<ProxyPool> {
        self.proxies.clone()
    }

    async fn close(&self) {
        self.slots.close();
        self.loader.close().await;
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
