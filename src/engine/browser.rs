//! Headless Chrome loader
//!
//! Pages are rendered in Chrome through the DevTools protocol, so content produced by
//! client-side scripts is visible to field rules. `headless_chrome` is a blocking API;
//! every call into it runs on the blocking pool, and a render that overruns its
//! budget has its tab closed to abort the pending protocol call.

use super::pipeline::{
    proxy_pool_from_config, rate_limiter_from_config, Engine, EngineSettings, LoadedPage,
    PageLoader,
};
use super::result::{ErrorKind, FetchError};
use super::static_engine::build_http_client;
use super::{random_user_agent, DEFAULT_ACCEPT_LANGUAGE};
use crate::config::{AuthConfig, BrowserConfig, Config, SettleCondition};
use crate::crawler::RunControl;
use crate::extract::XPathMatches;
use crate::robots::RobotsGate;
use crate::HarvestError;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Network;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

/// Engine that renders pages in headless Chrome
pub type BrowserEngine = Engine<ChromeLoader>;

/// Chrome exits after this long without a command
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(600);

/// Poll interval while waiting for the network to go quiet
const IDLE_POLL: Duration = Duration::from_millis(100);

const STATUS_SCRIPT: &str =
    "performance.getEntriesByType('navigation')[0]?.responseStatus || 0";

const RESOURCE_COUNT_SCRIPT: &str = "performance.getEntriesByType('resource').length";

/// Key for the browser that connects without a proxy
const DIRECT: &str = "";

/// How long a signed-in marker may take to appear after submitting the login form
const LOGIN_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything one render needs, owned so it can move to the blocking pool
#[derive(Debug, Clone)]
struct RenderJob {
    url: String,
    timeout: Duration,
    settle: SettleCondition,
    idle: Duration,
    settle_delay: Duration,
    stealth: bool,
    headers: Vec<(String, String)>,
    basic_auth: Option<(String, Option<String>)>,
    xpaths: Vec<String>,
}

/// Credentials and form selectors for a form login
#[derive(Debug, Clone, PartialEq, Eq)]
struct FormLogin {
    url: String,
    username_selector: String,
    password_selector: String,
    submit_selector: String,
    username: String,
    password: String,
    success_selector: Option<String>,
}

impl FormLogin {
    fn from_auth(auth: &AuthConfig) -> Option<Self> {
        match auth {
            AuthConfig::Form {
                login_url,
                username_selector,
                password_selector,
                submit_selector,
                username,
                password,
                success_selector,
            } => Some(Self {
                url: login_url.clone(),
                username_selector: username_selector.clone(),
                password_selector: password_selector.clone(),
                submit_selector: submit_selector.clone(),
                username: username.clone(),
                password: password.clone(),
                success_selector: success_selector.clone(),
            }),
            _ => None,
        }
    }
}

/// Loads pages by rendering them in Chrome
///
/// One browser process is launched lazily per proxy, since Chrome takes its proxy
/// at launch. With form login configured, each new browser signs in before its
/// first page, and its tabs share the session cookies.
pub struct ChromeLoader {
    options: BrowserConfig,
    timeout: Duration,
    headers: Vec<(String, String)>,
    auth: AuthConfig,
    login: Option<FormLogin>,
    retain_html: bool,
    browsers: Mutex<HashMap<String, Browser>>,
}

impl ChromeLoader {
    pub fn new(config: &Config) -> Self {
        let mut headers: Vec<(String, String)> = config
            .target
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        match &config.auth {
            AuthConfig::Bearer { token } => {
                headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
            }
            AuthConfig::Cookies { cookies } => {
                headers.push(("Cookie".to_string(), cookies.clone()));
            }
            AuthConfig::None | AuthConfig::Basic { .. } | AuthConfig::Form { .. } => {}
        }

        Self {
            options: config.browser.clone(),
            timeout: config.options.timeout(),
            headers,
            auth: config.auth.clone(),
            login: FormLogin::from_auth(&config.auth),
            retain_html: config.crawl.enabled,
            browsers: Mutex::new(HashMap::new()),
        }
    }

    /// Number of browser processes currently running
    pub async fn running_browsers(&self) -> usize {
        self.browsers.lock().await.len()
    }

    fn job(&self, url: &Url, xpaths: &[String]) -> RenderJob {
        RenderJob {
            url: url.to_string(),
            timeout: self.timeout,
            settle: self.options.settle,
            idle: Duration::from_millis(self.options.idle_ms),
            settle_delay: Duration::from_millis(self.options.settle_delay_ms),
            stealth: self.options.stealth,
            headers: self.headers.clone(),
            basic_auth: match &self.auth {
                AuthConfig::Basic { username, password } => {
                    Some((username.clone(), password.clone()))
                }
                _ => None,
            },
            xpaths: xpaths.to_vec(),
        }
    }

    /// Hard limit for one render, covering navigation and both settle phases
    fn budget(&self) -> Duration {
        self.timeout
            + Duration::from_millis(self.options.idle_ms)
            + Duration::from_millis(self.options.settle_delay_ms)
    }

    async fn browser_for(&self, proxy: Option<&str>) -> Result<Browser, FetchError> {
        let key = proxy.unwrap_or(DIRECT).to_string();
        let mut browsers = self.browsers.lock().await;
        if let Some(browser) = browsers.get(&key) {
            return Ok(browser.clone());
        }

        let options = self.options.clone();
        let proxy = proxy.map(str::to_string);
        tracing::info!(
            "Launching Chrome (headless: {}, proxy: {})",
            options.headless,
            proxy.as_deref().unwrap_or("direct")
        );

        let browser = tokio::task::spawn_blocking(move || launch(&options, proxy.as_deref()))
            .await
            .map_err(|e| FetchError::new(ErrorKind::Internal, e.to_string()))?
            .map_err(|e| FetchError::new(ErrorKind::Render, format!("Browser launch failed: {:#}", e)))?;

        if let Some(login) = self.login.clone() {
            tracing::info!("Signing in at {}", login.url);
            let session = browser.clone();
            let timeout = self.timeout;
            tokio::task::spawn_blocking(move || sign_in(&session, &login, timeout))
                .await
                .map_err(|e| FetchError::new(ErrorKind::Internal, e.to_string()))?
                .map_err(|e| {
                    let mut error = classify(&e);
                    error.message = format!("Form login failed: {}", error.message);
                    error
                })?;
        }

        browsers.insert(key, browser.clone());
        Ok(browser)
    }

    /// Drops a browser whose connection is no longer usable
    async fn discard_browser(&self, proxy: Option<&str>) {
        let key = proxy.unwrap_or(DIRECT);
        if self.browsers.lock().await.remove(key).is_some() {
            tracing::warn!("Discarding unresponsive browser ({})", proxy.unwrap_or("direct"));
        }
    }
}

fn launch(options: &BrowserConfig, proxy: Option<&str>) -> anyhow::Result<Browser> {
    let mut builder = LaunchOptions::default_builder();
    builder
        .headless(options.headless)
        .proxy_server(proxy)
        .idle_browser_timeout(IDLE_BROWSER_TIMEOUT);

    if let Some(path) = &options.chrome_path {
        builder.path(Some(PathBuf::from(path)));
    }

    let launch_options = builder
        .build()
        .map_err(|e| anyhow!("Failed to build launch options: {}", e))?;

    Browser::new(launch_options)
}

/// Submits the login form in a throwaway tab of `browser`
fn sign_in(browser: &Browser, login: &FormLogin, timeout: Duration) -> anyhow::Result<()> {
    let tab = browser.new_tab().context("Failed to open login tab")?;
    let outcome = submit_login(&tab, login, timeout);
    let _ = tab.close(false);
    outcome
}

fn submit_login(tab: &Tab, login: &FormLogin, timeout: Duration) -> anyhow::Result<()> {
    tab.set_default_timeout(timeout);
    tab.navigate_to(&login.url)?.wait_until_navigated()?;

    tab.wait_for_element(&login.username_selector)
        .context("Username input not found")?
        .click()?;
    tab.type_str(&login.username)?;

    tab.wait_for_element(&login.password_selector)
        .context("Password input not found")?
        .click()?;
    tab.type_str(&login.password)?;

    tab.wait_for_element(&login.submit_selector)
        .context("Submit control not found")?
        .click()?;
    tab.wait_until_navigated()?;

    if let Some(selector) = &login.success_selector {
        tab.wait_for_element_with_custom_timeout(selector, LOGIN_CONFIRM_TIMEOUT)
            .context("Signed-in marker never appeared")?;
    }
    Ok(())
}

/// Runs one render to completion on an open tab
fn render(tab: &Tab, job: &RenderJob) -> anyhow::Result<LoadedPage> {
    tab.set_default_timeout(job.timeout);

    if job.stealth {
        tab.enable_stealth_mode().context("Failed to enable stealth mode")?;
        tab.call_method(Network::SetUserAgentOverride {
            user_agent: random_user_agent().to_string(),
            accept_language: Some(DEFAULT_ACCEPT_LANGUAGE.to_string()),
            platform: None,
            user_agent_metadata: None,
        })
        .context("Failed to override user agent")?;
    }

    if !job.headers.is_empty() {
        let headers: HashMap<&str, &str> = job
            .headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        tab.set_extra_http_headers(headers)
            .context("Failed to set request headers")?;
    }

    if let Some((username, password)) = &job.basic_auth {
        tab.enable_fetch(None, Some(true))
            .context("Failed to enable request interception")?;
        tab.authenticate(Some(username.clone()), password.clone())
            .context("Failed to register credentials")?;
    }

    tab.navigate_to(&job.url)?.wait_until_navigated()?;

    if job.settle == SettleCondition::NetworkIdle {
        wait_for_network_idle(tab, job.idle, Instant::now() + job.timeout);
    }
    if !job.settle_delay.is_zero() {
        std::thread::sleep(job.settle_delay);
    }

    let status = tab
        .evaluate(STATUS_SCRIPT, false)
        .ok()
        .and_then(|remote| remote.value)
        .and_then(|value| value.as_u64())
        .map(|status| status as u16)
        .filter(|status| *status > 0)
        .unwrap_or(200);

    let html = tab.get_content().context("Failed to read page content")?;
    let xpath_matches = evaluate_xpaths(tab, &job.xpaths);

    Ok(LoadedPage {
        status,
        html,
        xpath_matches,
    })
}

/// Waits until no new resource has started for `quiet`, or until `deadline`
fn wait_for_network_idle(tab: &Tab, quiet: Duration, deadline: Instant) {
    let count = || {
        tab.evaluate(RESOURCE_COUNT_SCRIPT, false)
            .ok()
            .and_then(|remote| remote.value)
            .and_then(|value| value.as_u64())
    };

    let mut last = count();
    let mut stable_since = Instant::now();
    while Instant::now() < deadline && stable_since.elapsed() < quiet {
        std::thread::sleep(IDLE_POLL);
        let current = count();
        if current != last {
            last = current;
            stable_since = Instant::now();
        }
    }
}

/// Evaluates XPath expressions in the live document
///
/// Expressions that fail to evaluate produce no matches.
fn evaluate_xpaths(tab: &Tab, xpaths: &[String]) -> XPathMatches {
    if xpaths.is_empty() {
        return XPathMatches::new();
    }

    let Ok(expressions) = serde_json::to_string(xpaths) else {
        return XPathMatches::new();
    };

    let script = format!(
        r#"(() => {{
            const out = {{}};
            for (const expr of {}) {{
                const nodes = [];
                try {{
                    const snap = document.evaluate(expr, document, null,
                        XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
                    for (let i = 0; i < snap.snapshotLength; i++) {{
                        const node = snap.snapshotItem(i);
                        const attributes = {{}};
                        for (const attr of (node.attributes || [])) {{
                            attributes[attr.name] = attr.value;
                        }}
                        nodes.push({{
                            text: (node.textContent || '').trim(),
                            tag: (node.nodeName || '').toLowerCase(),
                            attributes,
                        }});
                    }}
                }} catch (e) {{}}
                out[expr] = nodes;
            }}
            return JSON.stringify(out);
        }})()"#,
        expressions
    );

    let raw = tab
        .evaluate(&script, false)
        .ok()
        .and_then(|remote| remote.value)
        .and_then(|value| value.as_str().map(str::to_string));

    match raw.map(|raw| serde_json::from_str::<XPathMatches>(&raw)) {
        Some(Ok(matches)) => matches,
        Some(Err(e)) => {
            tracing::debug!("Unreadable XPath results: {}", e);
            XPathMatches::new()
        }
        None => XPathMatches::new(),
    }
}

/// Maps a render failure onto the error taxonomy
fn classify(error: &anyhow::Error) -> FetchError {
    let message = format!("{:#}", error);
    let lowered = message.to_lowercase();
    let kind = if message.contains("net::ERR") {
        ErrorKind::Network
    } else if lowered.contains("timeout") || lowered.contains("timed out") {
        ErrorKind::Timeout
    } else {
        ErrorKind::Render
    };
    FetchError::new(kind, message)
}

#[async_trait]
impl PageLoader for ChromeLoader {
    fn name(&self) -> &'static str {
        "browser"
    }

    fn enforces_robots(&self) -> bool {
        false
    }

    fn retains_html(&self) -> bool {
        self.retain_html
    }

    async fn load(
        &self,
        url: &Url,
        proxy: Option<&str>,
        xpaths: &[String],
    ) -> Result<LoadedPage, FetchError> {
        let browser = self.browser_for(proxy).await?;

        let tab = match tokio::task::spawn_blocking(move || browser.new_tab()).await {
            Ok(Ok(tab)) => tab,
            Ok(Err(e)) => {
                self.discard_browser(proxy).await;
                return Err(FetchError::new(
                    ErrorKind::Render,
                    format!("Failed to open tab: {:#}", e),
                ));
            }
            Err(e) => return Err(FetchError::new(ErrorKind::Internal, e.to_string())),
        };

        let job = self.job(url, xpaths);
        let tab_for_job = tab.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let outcome = render(&tab_for_job, &job);
            let _ = tab_for_job.close(false);
            outcome
        });

        let page = match tokio::time::timeout(self.budget(), handle).await {
            Ok(Ok(Ok(page))) => page,
            Ok(Ok(Err(e))) => return Err(classify(&e)),
            Ok(Err(e)) => return Err(FetchError::new(ErrorKind::Internal, e.to_string())),
            Err(_) => {
                tracing::warn!("Render of {} overran {:?}, closing tab", url, self.budget());
                let _ = tab.close(false);
                return Err(FetchError::new(
                    ErrorKind::Timeout,
                    format!("Render timeout after {:?}", self.budget()),
                ));
            }
        };

        if page.status >= 400 {
            let reason = reqwest::StatusCode::from_u16(page.status)
                .ok()
                .and_then(|status| status.canonical_reason());
            return Err(FetchError::http_status(page.status, reason, Some(page.html)));
        }

        Ok(page)
    }

    async fn close(&self) {
        let mut browsers = self.browsers.lock().await;
        if !browsers.is_empty() {
            tracing::info!("Closing {} browser(s)", browsers.len());
        }
        browsers.clear();
    }
}

impl BrowserEngine {
    /// Builds the rendering engine for a run
    ///
    /// Chrome itself starts on the first load.
    pub fn from_config(config: &Config, control: Arc<RunControl>) -> Result<Self, HarvestError> {
        let robots_client = build_http_client(config.options.timeout(), None)?;

        Ok(Engine::new(
            ChromeLoader::new(config),
            EngineSettings::from_config(config),
            RobotsGate::new(robots_client, config.options.respect_robots),
            rate_limiter_from_config(config),
            Arc::new(proxy_pool_from_config(config)),
            control,
        ))
    }
}
