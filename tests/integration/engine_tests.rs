//! Integration tests for the HTTP fetch engine
//!
//! These tests run the static engine against wiremock servers and check retries,
//! robots enforcement, extraction and duplicate detection end-to-end.

use std::sync::Arc;
use std::time::Duration;
use sumi_extract::config::{AuthConfig, Config};
use sumi_extract::crawler::RunControl;
use sumi_extract::engine::{ErrorKind, FetchEngine, StaticEngine};
use sumi_extract::{FieldRule, SelectorKind};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a configuration with no delays, suitable for a local mock server
fn create_test_config(urls: Vec<String>, fields: Vec<FieldRule>) -> Config {
    let mut config = Config::new(urls, fields);
    config.rate_limit.min_delay = 0.0;
    config.rate_limit.max_delay = 0.0;
    config.rate_limit.adaptive = false;
    config.options.retry_count = 0;
    config.options.retry_backoff_ms = 10;
    config.options.timeout_seconds = 5.0;
    config
}

fn engine(config: &Config) -> StaticEngine {
    StaticEngine::from_config(config, Arc::new(RunControl::new()))
        .expect("Failed to build engine")
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(format!("<html><body>{}</body></html>", body))
        .insert_header("content-type", "text/html")
}

async fn requests_to(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == route)
        .count()
}

#[tokio::test]
async fn test_retries_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(html("<h1>Recovered</h1>"))
        .mount(&server)
        .await;

    let url = format!("{}/flaky", server.uri());
    let mut config = create_test_config(vec![url.clone()], vec![FieldRule::css("title", "h1")]);
    config.options.retry_count = 2;

    let result = engine(&config).scrape(&url, &config.fields).await;

    assert!(result.success, "expected success, got {:?}", result.error);
    assert_eq!(
        result.extracted_data.unwrap()["title"].as_deref(),
        Some("Recovered")
    );
    assert_eq!(result.http_status, Some(200));
    assert_eq!(requests_to(&server, "/flaky").await, 3);
    // Backoff of 10ms then 20ms between the three attempts
    assert!(result.elapsed_ms >= 30);
}

#[tokio::test]
async fn test_exhausted_retries_report_last_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let url = format!("{}/down", server.uri());
    let mut config = create_test_config(vec![url.clone()], vec![FieldRule::css("title", "h1")]);
    config.options.retry_count = 1;
    config.options.save_html_on_error = true;

    let result = engine(&config).scrape(&url, &config.fields).await;

    assert!(!result.success);
    assert!(result.extracted_data.is_none());
    assert_eq!(result.error_kind, Some(ErrorKind::HttpStatus(503)));
    assert_eq!(result.error.as_deref(), Some("HTTP 503: Service Unavailable"));
    assert_eq!(result.raw_html.as_deref(), Some("maintenance"));
    assert_eq!(requests_to(&server, "/down").await, 2);
}

#[tokio::test]
async fn test_not_found_message() {
    let server = MockServer::start().await;
    let url = format!("{}/missing", server.uri());
    let mut config = create_test_config(vec![url.clone()], vec![FieldRule::css("title", "h1")]);
    config.options.save_html_on_error = false;

    let result = engine(&config).scrape(&url, &config.fields).await;

    assert_eq!(result.error_kind, Some(ErrorKind::HttpStatus(404)));
    assert_eq!(result.error.as_deref(), Some("HTTP 404: Not Found"));
    assert!(result.raw_html.is_none());
}

#[tokio::test]
async fn test_robots_disallow_blocks_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private/page"))
        .respond_with(html("<h1>secret</h1>"))
        .mount(&server)
        .await;

    let url = format!("{}/private/page", server.uri());
    let config = create_test_config(vec![url.clone()], vec![FieldRule::css("title", "h1")]);
    let engine = engine(&config);

    let warning = engine.check_robots(&url).await.expect("should be disallowed");
    assert_eq!(warning.disallowed_paths, vec!["/private/page".to_string()]);

    let result = engine.scrape(&url, &config.fields).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::RobotsBlocked));
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .starts_with("Blocked by robots.txt"));
    assert_eq!(requests_to(&server, "/private/page").await, 0);
    assert_eq!(requests_to(&server, "/robots.txt").await, 1);
}

#[tokio::test]
async fn test_robots_ignored_when_disabled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html("<h1>open</h1>"))
        .mount(&server)
        .await;

    let url = format!("{}/page", server.uri());
    let mut config = create_test_config(vec![url.clone()], vec![FieldRule::css("title", "h1")]);
    config.options.respect_robots = false;

    let result = engine(&config).scrape(&url, &config.fields).await;
    assert!(result.success);
    assert_eq!(requests_to(&server, "/robots.txt").await, 0);
}

#[tokio::test]
async fn test_fields_sanitized_and_fallbacks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contact"))
        .respond_with(html(
            r#"<h2 class="name">  Jane
                 Doe </h2>
               <a class="mail" href="mailto:jane@example.com">write</a>
               <span class="phone">555&#8203;-0100</span>"#,
        ))
        .mount(&server)
        .await;

    let url = format!("{}/contact", server.uri());
    let fields = vec![
        FieldRule::css("name", "h1.name").with_fallbacks(["h2.name"]),
        FieldRule::css("email", "a.mail").with_attribute("href"),
        FieldRule::css("phone", ".phone"),
        FieldRule::css("fax", ".fax"),
    ];
    let config = create_test_config(vec![url.clone()], fields);

    let result = engine(&config).scrape(&url, &config.fields).await;
    let data = result.extracted_data.expect("should have data");

    assert_eq!(data["name"].as_deref(), Some("Jane Doe"));
    assert_eq!(data["email"].as_deref(), Some("jane@example.com"));
    assert_eq!(data["phone"].as_deref(), Some("555-0100"));
    assert_eq!(data["fax"], None);
    assert!(result.error_kind.is_none());
}

#[tokio::test]
async fn test_duplicate_content_flagged() {
    let server = MockServer::start().await;
    for route in ["/a", "/b"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(html("<h1>Same listing</h1>"))
            .mount(&server)
            .await;
    }

    let urls = vec![format!("{}/a", server.uri()), format!("{}/b", server.uri())];
    let config = create_test_config(urls.clone(), vec![FieldRule::css("title", "h1")]);
    let engine = engine(&config);

    let first = engine.scrape(&urls[0], &config.fields).await;
    let second = engine.scrape(&urls[1], &config.fields).await;

    assert!(first.success && !first.is_duplicate());
    assert!(second.success && second.is_duplicate());
    assert_eq!(second.error.as_deref(), Some("Duplicate detected"));
}

#[tokio::test]
async fn test_xpath_rules_never_match_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/x"))
        .respond_with(html("<h1>Title</h1>"))
        .mount(&server)
        .await;

    let url = format!("{}/x", server.uri());
    let config = create_test_config(vec![url.clone()], vec![FieldRule::xpath("title", "//h1")]);

    let result = engine(&config).scrape(&url, &config.fields).await;
    assert!(result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::NoFieldsMatched));
}

#[tokio::test]
async fn test_headers_and_bearer_auth_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(header("authorization", "Bearer s3cret"))
        .and(header("x-client", "sumi"))
        .respond_with(html("<h1>Authorized</h1>"))
        .mount(&server)
        .await;

    let url = format!("{}/api", server.uri());
    let mut config = create_test_config(vec![url.clone()], vec![FieldRule::css("title", "h1")]);
    config.auth = AuthConfig::Bearer {
        token: "s3cret".to_string(),
    };
    config
        .target
        .headers
        .insert("X-Client".to_string(), "sumi".to_string());

    let result = engine(&config).scrape(&url, &config.fields).await;
    assert!(result.success, "request did not carry headers: {:?}", result.error);
}

#[tokio::test]
async fn test_batch_preserves_input_order() {
    let server = MockServer::start().await;
    for i in 0..4 {
        Mock::given(method("GET"))
            .and(path(format!("/item/{}", i)))
            .respond_with(
                html(&format!("<h1>Item {}</h1>", i)).set_delay(Duration::from_millis(40 - i * 10)),
            )
            .mount(&server)
            .await;
    }

    let urls: Vec<String> = (0..4).map(|i| format!("{}/item/{}", server.uri(), i)).collect();
    let mut config = create_test_config(urls.clone(), vec![FieldRule::css("title", "h1")]);
    config.rate_limit.max_concurrent = 4;

    let results = engine(&config).scrape_batch(&urls, &config.fields).await;

    assert_eq!(results.len(), 4);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.url, urls[i]);
        assert_eq!(
            result.extracted_data.as_ref().unwrap()["title"].as_deref(),
            Some(format!("Item {}", i).as_str())
        );
    }
}

#[tokio::test]
async fn test_probe_selector() {
    let server = MockServer::start().await;
    let items: String = (0..12).map(|i| format!("<li class=\"row\">Row {}</li>", i)).collect();
    Mock::given(method("GET"))
        .and(path("/table"))
        .respond_with(html(&format!("<ul>{}</ul>", items)))
        .mount(&server)
        .await;

    let url = format!("{}/table", server.uri());
    let config = create_test_config(vec![url.clone()], vec![FieldRule::css("row", "li")]);

    let probe = engine(&config)
        .probe_selector(&url, "li.row", SelectorKind::Css)
        .await;

    assert_eq!(probe.count, 12);
    assert_eq!(probe.samples.len(), 10);
    assert_eq!(probe.samples[3].text, "Row 3");
    assert!(probe.error.is_none());
}

#[tokio::test]
async fn test_probe_selector_respects_robots() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /admin"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/list"))
        .respond_with(html("<li>hidden</li>"))
        .mount(&server)
        .await;

    let url = format!("{}/admin/list", server.uri());
    let config = create_test_config(vec![url.clone()], vec![FieldRule::css("row", "li")]);

    let probe = engine(&config).probe_selector(&url, "li", SelectorKind::Css).await;

    assert_eq!(probe.count, 0);
    assert!(probe
        .error
        .as_deref()
        .unwrap()
        .starts_with("Blocked by robots.txt"));
    assert_eq!(requests_to(&server, "/admin/list").await, 0);
}
