//! Plain HTTP loader
//!
//! Fetches pages with `reqwest`. One client is built per proxy and reused; the
//! direct client also serves robots.txt requests.

use super::pipeline::{
    proxy_pool_from_config, rate_limiter_from_config, Engine, EngineSettings, LoadedPage,
    PageLoader,
};
use super::result::FetchError;
use super::{random_user_agent, DEFAULT_ACCEPT, DEFAULT_ACCEPT_LANGUAGE};
use crate::config::{AuthConfig, Config};
use crate::crawler::RunControl;
use crate::robots::RobotsGate;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, COOKIE, USER_AGENT};
use reqwest::{Client, Proxy};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// Engine that fetches pages over plain HTTP
pub type StaticEngine = Engine<HttpLoader>;

/// Connect timeout applied to every client
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds an HTTP client for page requests
///
/// # Arguments
///
/// * `timeout` - Total request timeout
/// * `proxy` - Optional proxy URL routing every scheme
///
/// # Returns
///
/// A client with compression enabled, or an error if the proxy URL is unusable
pub fn build_http_client(timeout: Duration, proxy: Option<&str>) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    builder.build()
}

/// Converts configured headers, dropping any that are not valid HTTP
fn header_map(headers: &BTreeMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => tracing::warn!("Ignoring invalid header: {}", name),
        }
    }
    map
}

/// Loads pages with a single GET request per attempt
pub struct HttpLoader {
    direct: Client,
    by_proxy: Mutex<HashMap<String, Client>>,
    timeout: Duration,
    headers: HeaderMap,
    auth: AuthConfig,
}

impl HttpLoader {
    pub fn new(
        timeout: Duration,
        headers: &BTreeMap<String, String>,
        auth: AuthConfig,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            direct: build_http_client(timeout, None)?,
            by_proxy: Mutex::new(HashMap::new()),
            timeout,
            headers: header_map(headers),
            auth,
        })
    }

    /// Client without a proxy
    pub fn client(&self) -> &Client {
        &self.direct
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<Client, FetchError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        let mut clients = self.by_proxy.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(proxy) {
            return Ok(client.clone());
        }

        let client = build_http_client(self.timeout, Some(proxy))
            .map_err(|e| FetchError::from_reqwest(&e))?;
        clients.insert(proxy.to_string(), client.clone());
        Ok(client)
    }

    fn request(&self, client: &Client, url: &Url) -> reqwest::RequestBuilder {
        let mut request = client
            .get(url.clone())
            .header(USER_AGENT, random_user_agent())
            .header(ACCEPT, DEFAULT_ACCEPT)
            .header(ACCEPT_LANGUAGE, DEFAULT_ACCEPT_LANGUAGE)
            .header("DNT", "1")
            .header("Upgrade-Insecure-Requests", "1")
            .headers(self.headers.clone());

        request = match &self.auth {
            AuthConfig::None => request,
            AuthConfig::Bearer { token } => request.bearer_auth(token),
            AuthConfig::Basic { username, password } => {
                request.basic_auth(username, password.as_deref())
            }
            AuthConfig::Cookies { cookies } => request.header(COOKIE, cookies.as_str()),
            // Validation only accepts form login for the browser engine
            AuthConfig::Form { .. } => request,
        };

        request
    }
}

#[async_trait]
impl PageLoader for HttpLoader {
    fn name(&self) -> &'static str {
        "static"
    }

    fn enforces_robots(&self) -> bool {
        true
    }

    fn retains_html(&self) -> bool {
        true
    }

    async fn load(
        &self,
        url: &Url,
        proxy: Option<&str>,
        _xpaths: &[String],
    ) -> Result<LoadedPage, FetchError> {
        let client = self.client_for(proxy)?;
        let response = self
            .request(&client, url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        if !status.is_success() {
            return Err(FetchError::http_status(
                status.as_u16(),
                status.canonical_reason(),
                Some(body),
            ));
        }

        Ok(LoadedPage {
            status: status.as_u16(),
            html: body,
            xpath_matches: Default::default(),
        })
    }

    async fn close(&self) {
        self.by_proxy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl StaticEngine {
    /// Builds the HTTP engine for a run
    pub fn from_config(config: &Config, control: Arc<RunControl>) -> Result<Self, reqwest::Error> {
        let loader = HttpLoader::new(
            config.options.timeout(),
            &config.target.headers,
            config.auth.clone(),
        )?;
        let robots = RobotsGate::new(loader.client().clone(), config.options.respect_robots);

        Ok(Engine::new(
            loader,
            EngineSettings::from_config(config),
            robots,
            rate_limiter_from_config(config),
            Arc::new(proxy_pool_from_config(config)),
            control,
        ))
    }
}
