use crate::config::types::{
    AuthConfig, Config, CrawlConfig, OptionsConfig, ProxyConfig, RateLimitConfig, SiteType,
};
use crate::extract::{FieldRule, SelectorKind};
use crate::url::parse_http_url;
use crate::ConfigError;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Upper bound on retries after the first attempt
const MAX_RETRY_COUNT: u32 = 10;

/// Validates the entire configuration
///
/// An empty URL list or field list is accepted here; a run reports it when it starts.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_seed_urls(&config.target.urls)?;
    validate_fields(&config.fields)?;
    validate_options(&config.options)?;
    validate_rate_limit(&config.rate_limit)?;
    validate_proxy_config(&config.proxy)?;
    validate_crawl_config(&config.crawl)?;
    validate_auth_config(&config.auth, config.target.site_type)?;
    Ok(())
}

/// Every seed must be an absolute HTTP(S) URL
fn validate_seed_urls(urls: &[String]) -> Result<(), ConfigError> {
    for url in urls {
        parse_http_url(url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", url, e)))?;
    }
    Ok(())
}

/// Validates field rules: unique non-empty names, parseable CSS selectors
fn validate_fields(fields: &[FieldRule]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();

    for field in fields {
        if field.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "field name cannot be empty".to_string(),
            ));
        }

        if !names.insert(field.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate field name '{}'",
                field.name
            )));
        }

        for selector in field.selectors() {
            if selector.trim().is_empty() {
                return Err(ConfigError::InvalidSelector {
                    field: field.name.clone(),
                    selector: selector.to_string(),
                });
            }

            // XPath is evaluated by the browser and cannot be checked here
            if field.selector_kind == SelectorKind::Css && Selector::parse(selector).is_err() {
                return Err(ConfigError::InvalidSelector {
                    field: field.name.clone(),
                    selector: selector.to_string(),
                });
            }
        }
    }

    Ok(())
}

fn validate_options(options: &OptionsConfig) -> Result<(), ConfigError> {
    if options.retry_count > MAX_RETRY_COUNT {
        return Err(ConfigError::Validation(format!(
            "retry-count must be <= {}, got {}",
            MAX_RETRY_COUNT, options.retry_count
        )));
    }

    if !options.timeout_seconds.is_finite() || options.timeout_seconds <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "timeout-seconds must be > 0, got {}",
            options.timeout_seconds
        )));
    }

    Ok(())
}

fn validate_rate_limit(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if config.max_concurrent < 1 || config.max_concurrent > 100 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent must be between 1 and 100, got {}",
            config.max_concurrent
        )));
    }

    if !config.min_delay.is_finite() || config.min_delay < 0.0 {
        return Err(ConfigError::Validation(format!(
            "min-delay must be >= 0, got {}",
            config.min_delay
        )));
    }

    if !config.max_delay.is_finite() || config.max_delay < config.min_delay {
        return Err(ConfigError::Validation(format!(
            "max-delay must be >= min-delay ({}), got {}",
            config.min_delay, config.max_delay
        )));
    }

    Ok(())
}

fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    for proxy in &config.proxies {
        let url = Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;

        if !matches!(url.scheme(), "http" | "https" | "socks5" | "socks5h") {
            return Err(ConfigError::Validation(format!(
                "Proxy '{}' must use http, https or socks5",
                proxy
            )));
        }
    }

    if config.failure_threshold < 1 {
        return Err(ConfigError::Validation(
            "failure-threshold must be >= 1".to_string(),
        ));
    }

    Url::parse(&config.health_check_url).map_err(|e| {
        ConfigError::InvalidUrl(format!(
            "Invalid health-check-url '{}': {}",
            config.health_check_url, e
        ))
    })?;

    Ok(())
}

fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if !config.enabled {
        return Ok(());
    }

    if config.link_selectors.is_empty() {
        return Err(ConfigError::Validation(
            "crawl is enabled but link-selectors is empty".to_string(),
        ));
    }

    for selector in &config.link_selectors {
        if Selector::parse(selector).is_err() {
            return Err(ConfigError::InvalidSelector {
                field: "crawl.link-selectors".to_string(),
                selector: selector.clone(),
            });
        }
    }

    Ok(())
}

/// Form login needs a browser to fill the form, so only `site-type = "browser"` accepts it
fn validate_auth_config(config: &AuthConfig, site_type: SiteType) -> Result<(), ConfigError> {
    match config {
        AuthConfig::Form { .. } if site_type != SiteType::Browser => Err(ConfigError::Validation(
            "form auth requires site-type = \"browser\"".to_string(),
        )),
        AuthConfig::Form {
            login_url,
            username_selector,
            password_selector,
            submit_selector,
            username,
            success_selector,
            ..
        } => {
            parse_http_url(login_url).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid login URL '{}': {}", login_url, e))
            })?;
            if username.is_empty() {
                return Err(ConfigError::Validation(
                    "form auth requires a username".to_string(),
                ));
            }
            let selectors = [
                Some(username_selector),
                Some(password_selector),
                Some(submit_selector),
                success_selector.as_ref(),
            ];
            for selector in selectors.into_iter().flatten() {
                if selector.trim().is_empty() || Selector::parse(selector).is_err() {
                    return Err(ConfigError::InvalidSelector {
                        field: "auth".to_string(),
                        selector: selector.clone(),
                    });
                }
            }
            Ok(())
        }
        AuthConfig::Bearer { token } if token.trim().is_empty() => Err(ConfigError::Validation(
            "bearer auth requires a token".to_string(),
        )),
        AuthConfig::Basic { username, .. } if username.is_empty() => Err(
            ConfigError::Validation("basic auth requires a username".to_string()),
        ),
        AuthConfig::Cookies { cookies } if cookies.trim().is_empty() => Err(
            ConfigError::Validation("cookie auth requires a cookie string".to_string()),
        ),
        _ => Ok(()),
    }
}
