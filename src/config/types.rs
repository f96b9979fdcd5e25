use crate::extract::FieldRule;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for Sumi-Extract
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_name")]
    pub name: String,

    pub target: TargetConfig,

    #[serde(rename = "field", default)]
    pub fields: Vec<FieldRule>,

    #[serde(default)]
    pub options: OptionsConfig,

    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub crawl: CrawlConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub browser: BrowserConfig,
}

impl Config {
    /// Builds a configuration with default options for the given targets
    pub fn new(urls: Vec<String>, fields: Vec<FieldRule>) -> Self {
        Self {
            name: default_name(),
            target: TargetConfig {
                urls,
                ..TargetConfig::default()
            },
            fields,
            options: OptionsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            proxy: ProxyConfig::default(),
            crawl: CrawlConfig::default(),
            auth: AuthConfig::default(),
            browser: BrowserConfig::default(),
        }
    }
}

fn default_name() -> String {
    "Untitled Project".to_string()
}

/// Which engine fetches the pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteType {
    /// Currently the plain-HTTP engine
    #[default]
    Auto,
    Static,
    Browser,
}

/// Where the seed URLs come from
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub urls: Vec<String>,

    /// Template with a numeric range, e.g. `https://example.com/page/{1-10}`
    #[serde(rename = "url-pattern", default)]
    pub url_pattern: Option<String>,

    /// File with one URL per line; `#` starts a comment line
    #[serde(rename = "urls-file", default)]
    pub urls_file: Option<String>,

    #[serde(rename = "site-type", default)]
    pub site_type: SiteType,

    /// Extra request headers, applied after the built-in ones
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Which failed results pause the run for a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PauseOn {
    /// HTTP 4xx responses
    #[default]
    ClientErrors,
    AnyFailure,
    Never,
}

/// Fetch behavior options
#[derive(Debug, Clone, Deserialize)]
pub struct OptionsConfig {
    /// Retries after the first attempt
    #[serde(rename = "retry-count", default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(rename = "timeout-seconds", default = "default_timeout_seconds")]
    pub timeout_seconds: f64,

    /// Base of the exponential back-off between attempts (milliseconds)
    #[serde(rename = "retry-backoff-ms", default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(rename = "respect-robots", default = "default_true")]
    pub respect_robots: bool,

    #[serde(rename = "detect-duplicates", default = "default_true")]
    pub detect_duplicates: bool,

    #[serde(rename = "save-html-on-error", default = "default_true")]
    pub save_html_on_error: bool,

    #[serde(rename = "pause-on", default)]
    pub pause_on: PauseOn,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            timeout_seconds: default_timeout_seconds(),
            retry_backoff_ms: default_retry_backoff_ms(),
            respect_robots: true,
            detect_duplicates: true,
            save_html_on_error: true,
            pause_on: PauseOn::default(),
        }
    }
}

impl OptionsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds.max(0.0))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn default_retry_count() -> u32 {
    3
}

fn default_timeout_seconds() -> f64 {
    30.0
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

/// Politeness configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Lower bound of the delay before each request (seconds)
    #[serde(rename = "min-delay", default = "default_min_delay")]
    pub min_delay: f64,

    /// Upper bound of the delay before each request (seconds)
    #[serde(rename = "max-delay", default = "default_max_delay")]
    pub max_delay: f64,

    #[serde(rename = "max-concurrent", default = "default_max_concurrent")]
    pub max_concurrent: u32,

    /// Double the delay for every consecutive error
    #[serde(default = "default_true")]
    pub adaptive: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_delay: default_min_delay(),
            max_delay: default_max_delay(),
            max_concurrent: default_max_concurrent(),
            adaptive: true,
        }
    }
}

fn default_min_delay() -> f64 {
    1.0
}

fn default_max_delay() -> f64 {
    3.0
}

fn default_max_concurrent() -> u32 {
    3
}

/// Proxy pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub proxies: Vec<String>,

    #[serde(default = "default_true")]
    pub rotate: bool,

    /// Consecutive failures before a proxy leaves rotation
    #[serde(rename = "failure-threshold", default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// URL requested through each proxy by a health check
    #[serde(rename = "health-check-url", default = "default_health_check_url")]
    pub health_check_url: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            proxies: Vec::new(),
            rotate: true,
            failure_threshold: default_failure_threshold(),
            health_check_url: default_health_check_url(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    crate::proxy::DEFAULT_FAILURE_THRESHOLD
}

fn default_health_check_url() -> String {
    "https://httpbin.org/ip".to_string()
}

/// Link-following configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    #[serde(default)]
    pub enabled: bool,

    /// CSS selectors whose `href` attributes are followed
    #[serde(rename = "link-selectors", default)]
    pub link_selectors: Vec<String>,

    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: usize,

    #[serde(rename = "same-domain-only", default = "default_true")]
    pub same_domain_only: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            link_selectors: Vec::new(),
            max_pages: default_max_pages(),
            same_domain_only: true,
        }
    }
}

fn default_max_pages() -> usize {
    100
}

/// Authentication applied to every request
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
    #[default]
    None,
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        #[serde(default)]
        password: Option<String>,
    },
    /// Raw `Cookie` header value, e.g. `session=abc; theme=dark`
    Cookies {
        cookies: String,
    },
    /// Sign in through an HTML login form before the first page; browser engine only
    Form {
        #[serde(rename = "login-url")]
        login_url: String,
        #[serde(rename = "username-selector")]
        username_selector: String,
        #[serde(rename = "password-selector")]
        password_selector: String,
        #[serde(rename = "submit-selector")]
        submit_selector: String,
        username: String,
        password: String,
        /// Element that only appears once signed in
        #[serde(rename = "success-selector", default)]
        success_selector: Option<String>,
    },
}

/// When a rendered page is considered ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettleCondition {
    /// The load event fired
    Load,
    /// The load event fired and no new resources started for `idle-ms`
    #[default]
    NetworkIdle,
}

/// Headless browser configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default)]
    pub settle: SettleCondition,

    /// Quiet window for `network-idle` (milliseconds)
    #[serde(rename = "idle-ms", default = "default_idle_ms")]
    pub idle_ms: u64,

    /// Extra fixed wait after settling, for late client-side rendering (milliseconds)
    #[serde(rename = "settle-delay-ms", default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Randomize the user agent and hide automation markers
    #[serde(default = "default_true")]
    pub stealth: bool,

    /// Chrome binary; auto-detected when unset
    #[serde(rename = "chrome-path", default)]
    pub chrome_path: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            settle: SettleCondition::default(),
            idle_ms: default_idle_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            stealth: true,
            chrome_path: None,
        }
    }
}

fn default_idle_ms() -> u64 {
    500
}

fn default_settle_delay_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_defaults() {
        let config: Config = toml::from_str(
            r#"
            [target]
            urls = ["https://example.com/"]
            "#,
        )
        .unwrap();

        assert_eq!(config.name, "Untitled Project");
        assert_eq!(config.target.site_type, SiteType::Auto);
        assert!(config.fields.is_empty());
        assert_eq!(config.options.retry_count, 3);
        assert_eq!(config.options.timeout(), Duration::from_secs(30));
        assert!(config.options.respect_robots);
        assert!(config.options.detect_duplicates);
        assert!(config.options.save_html_on_error);
        assert_eq!(config.options.pause_on, PauseOn::ClientErrors);
        assert_eq!(config.rate_limit.min_delay, 1.0);
        assert_eq!(config.rate_limit.max_delay, 3.0);
        assert_eq!(config.rate_limit.max_concurrent, 3);
        assert!(config.rate_limit.adaptive);
        assert_eq!(config.proxy.failure_threshold, 3);
        assert!(!config.crawl.enabled);
        assert!(config.crawl.same_domain_only);
        assert_eq!(config.auth, AuthConfig::None);
        assert_eq!(config.browser.settle, SettleCondition::NetworkIdle);
    }

    #[test]
    fn test_auth_variants() {
        let auth: AuthConfig = toml::from_str("type = \"bearer\"\ntoken = \"abc\"").unwrap();
        assert_eq!(auth, AuthConfig::Bearer { token: "abc".into() });

        let auth: AuthConfig = toml::from_str("type = \"basic\"\nusername = \"u\"").unwrap();
        assert_eq!(
            auth,
            AuthConfig::Basic {
                username: "u".into(),
                password: None
            }
        );

        let auth: AuthConfig = toml::from_str("type = \"cookies\"\ncookies = \"a=1\"").unwrap();
        assert_eq!(auth, AuthConfig::Cookies { cookies: "a=1".into() });

        let auth: AuthConfig = toml::from_str(
            r##"
            type = "form"
            login-url = "https://example.com/login"
            username-selector = "#user"
            password-selector = "#pass"
            submit-selector = "button[type=submit]"
            username = "ada"
            password = "s3cret"
            "##,
        )
        .unwrap();
        match auth {
            AuthConfig::Form {
                login_url,
                submit_selector,
                success_selector,
                ..
            } => {
                assert_eq!(login_url, "https://example.com/login");
                assert_eq!(submit_selector, "button[type=submit]");
                assert_eq!(success_selector, None);
            }
            other => panic!("expected form auth, got {:?}", other),
        }
    }

    #[test]
    fn test_fields_table_array() {
        let config: Config = toml::from_str(
            r#"
            [target]
            urls = ["https://example.com/"]
            site-type = "browser"

            [[field]]
            name = "title"
            selector = "h1"

            [[field]]
            name = "link"
            selector = "a.more"
            attribute = "href"
            "#,
        )
        .unwrap();

        assert_eq!(config.target.site_type, SiteType::Browser);
        assert_eq!(config.fields.len(), 2);
        assert_eq!(config.fields[1].attribute.as_deref(), Some("href"));
    }
}
