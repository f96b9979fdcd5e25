//! Integration tests for full runs
//!
//! These tests use wiremock to create mock HTTP servers and drive the
//! orchestrator through crawls, pauses and stops end-to-end.

use std::time::Duration;
use sumi_extract::config::{load_config, Config, PauseOn};
use sumi_extract::crawler::{Event, EventSink, Orchestrator, RunState};
use sumi_extract::{ErrorKind, FieldRule, HarvestError};
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a configuration with no delays, suitable for a local mock server
fn create_test_config(urls: Vec<String>) -> Config {
    let mut config = Config::new(urls, vec![FieldRule::css("title", "h1")]);
    config.rate_limit.min_delay = 0.0;
    config.rate_limit.max_delay = 0.0;
    config.rate_limit.adaptive = false;
    config.options.retry_count = 0;
    config.options.timeout_seconds = 5.0;
    config
}

async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("<html><body>{}</body></html>", body))
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

fn results(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Result(r) => Some(r.url.clone()),
            _ => None,
        })
        .collect()
}

async fn collect(mut rx: UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// Waits for the next pause event, failing the test after a second
async fn next_pause(rx: &mut UnboundedReceiver<Event>, seen: &mut Vec<Event>) -> String {
    let wait = async {
        while let Some(event) = rx.recv().await {
            if let Event::Paused { reason, .. } = &event {
                let reason = reason.clone();
                seen.push(event);
                return reason;
            }
            seen.push(event);
        }
        panic!("channel closed before pause");
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("run never paused")
}

#[tokio::test]
async fn test_breadth_first_crawl_with_page_cap() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<h1>Home</h1><a href="/b">B</a><a href="/c">C</a><a href="http://elsewhere.invalid/d">D</a>"#,
    )
    .await;
    mount_page(&server, "/b", r#"<h1>B</h1><a href="/e">E</a>"#).await;
    mount_page(&server, "/c", "<h1>C</h1>").await;
    mount_page(&server, "/e", "<h1>E</h1>").await;

    let mut config = create_test_config(vec![format!("{}/", base)]);
    config.crawl.enabled = true;
    config.crawl.link_selectors = vec!["a".to_string()];
    config.crawl.max_pages = 3;

    let (events, rx) = EventSink::channel();
    let orchestrator = Orchestrator::from_config(config, events).unwrap();
    let summary = orchestrator.run().await.unwrap();
    drop(orchestrator);

    let events = collect(rx).await;
    assert_eq!(
        results(&events),
        vec![format!("{}/", base), format!("{}/b", base), format!("{}/c", base)]
    );
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.final_state, RunState::Completed);

    let last_progress = events
        .iter()
        .filter_map(|e| match e {
            Event::Progress { current, total } => Some((*current, *total)),
            _ => None,
        })
        .last();
    assert_eq!(last_progress, Some((3, 3)));
    assert!(matches!(events.last(), Some(Event::Completed(_))));
}

#[tokio::test]
async fn test_zero_page_cap_fetches_nothing() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "<h1>Home</h1>").await;

    let mut config = create_test_config(vec![format!("{}/", server.uri())]);
    config.crawl.enabled = true;
    config.crawl.link_selectors = vec!["a".to_string()];
    config.crawl.max_pages = 0;

    let (events, rx) = EventSink::channel();
    let orchestrator = Orchestrator::from_config(config, events).unwrap();
    let summary = orchestrator.run().await.unwrap();
    drop(orchestrator);

    assert_eq!(summary.attempted, 0);
    assert_eq!(summary.final_state, RunState::Completed);
    assert!(results(&collect(rx).await).is_empty());
    assert!(server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .all(|r| r.url.path() != "/"));
}

#[tokio::test]
async fn test_not_found_pauses_and_skip_discards() {
    let server = MockServer::start().await;
    mount_page(&server, "/first", "<h1>First</h1>").await;
    mount_page(&server, "/last", "<h1>Last</h1>").await;

    let urls = vec![
        format!("{}/first", server.uri()),
        format!("{}/gone", server.uri()),
        format!("{}/last", server.uri()),
    ];
    let config = create_test_config(urls.clone());

    let (events, mut rx) = EventSink::channel();
    let orchestrator = Orchestrator::from_config(config, events).unwrap();
    let handle = orchestrator.handle();
    let run = tokio::spawn(async move { orchestrator.run().await });

    let mut seen = Vec::new();
    let reason = next_pause(&mut rx, &mut seen).await;
    assert_eq!(reason, "HTTP 404: Not Found");
    assert!(handle.is_paused());
    assert!(handle.skip_current());

    let summary = run.await.unwrap().unwrap();
    seen.extend(collect(rx).await);

    assert_eq!(results(&seen), vec![urls[0].clone(), urls[2].clone()]);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.final_state, RunState::Completed);
}

#[tokio::test]
async fn test_stop_while_paused_ends_run() {
    let server = MockServer::start().await;
    mount_page(&server, "/never", "<h1>Never</h1>").await;

    let urls = vec![
        format!("{}/gone", server.uri()),
        format!("{}/never", server.uri()),
    ];
    let config = create_test_config(urls);

    let (events, mut rx) = EventSink::channel();
    let orchestrator = Orchestrator::from_config(config, events).unwrap();
    let handle = orchestrator.handle();
    let run = tokio::spawn(async move { orchestrator.run().await });

    let mut seen = Vec::new();
    next_pause(&mut rx, &mut seen).await;
    handle.stop();
    handle.stop();

    let summary = run.await.unwrap().unwrap();
    seen.extend(collect(rx).await);

    assert_eq!(summary.final_state, RunState::Stopped);
    assert_eq!(summary.attempted, 0);
    assert!(results(&seen).is_empty());
    assert!(!handle.is_running());
    assert!(server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .all(|r| r.url.path() != "/never"));
}

#[tokio::test]
async fn test_resume_keeps_failed_result() {
    let server = MockServer::start().await;
    let url = format!("{}/gone", server.uri());
    let config = create_test_config(vec![url.clone()]);

    let (events, mut rx) = EventSink::channel();
    let orchestrator = Orchestrator::from_config(config, events).unwrap();
    let handle = orchestrator.handle();
    let run = tokio::spawn(async move { orchestrator.run().await });

    let mut seen = Vec::new();
    next_pause(&mut rx, &mut seen).await;
    assert!(handle.resume());

    let summary = run.await.unwrap().unwrap();
    seen.extend(collect(rx).await);

    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.failed(), 1);
    let kept = seen.iter().find_map(|e| match e {
        Event::Result(r) => Some(r.clone()),
        _ => None,
    });
    assert_eq!(kept.unwrap().error_kind, Some(ErrorKind::HttpStatus(404)));
}

#[tokio::test]
async fn test_pause_policy_never() {
    let server = MockServer::start().await;
    let mut config = create_test_config(vec![format!("{}/gone", server.uri())]);
    config.options.pause_on = PauseOn::Never;

    let orchestrator = Orchestrator::from_config(config, EventSink::disconnected()).unwrap();
    let summary = tokio::time::timeout(Duration::from_secs(5), orchestrator.run())
        .await
        .expect("run should not pause")
        .unwrap();

    assert_eq!(summary.failed(), 1);
}

#[tokio::test]
async fn test_empty_fields_rejected_before_fetching() {
    let server = MockServer::start().await;
    let mut config = create_test_config(vec![format!("{}/", server.uri())]);
    config.fields.clear();

    let (events, rx) = EventSink::channel();
    let orchestrator = Orchestrator::from_config(config, events).unwrap();
    let err = orchestrator.run().await.unwrap_err();
    drop(orchestrator);

    assert!(matches!(err, HarvestError::NoUrlsOrNoFields(_)));
    let events = collect(rx).await;
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Event::Error(_)));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_project_file_with_url_pattern() {
    let server = MockServer::start().await;
    for i in 1..=3 {
        mount_page(&server, &format!("/page/{}", i), &format!("<h1>Page {}</h1>", i)).await;
    }

    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("project.toml");
    std::fs::write(
        &project,
        format!(
            r#"
name = "Pattern test"

[target]
url-pattern = "{}/page/{{1-3}}"

[[field]]
name = "title"
selector = "h1"

[options]
retry-count = 0

[rate-limit]
min-delay = 0.0
max-delay = 0.0
adaptive = false
"#,
            server.uri()
        ),
    )
    .unwrap();

    let config = load_config(&project).unwrap();
    assert_eq!(config.target.urls.len(), 3);

    let (events, rx) = EventSink::channel();
    let orchestrator = Orchestrator::from_config(config, events).unwrap();
    let summary = orchestrator.run().await.unwrap();
    drop(orchestrator);

    assert_eq!(summary.succeeded, 3);
    let titles: Vec<String> = collect(rx)
        .await
        .into_iter()
        .filter_map(|e| match e {
            Event::Result(r) => r.extracted_data.and_then(|d| d["title"].clone()),
            _ => None,
        })
        .collect();
    assert_eq!(titles, vec!["Page 1", "Page 2", "Page 3"]);
}

#[tokio::test]
async fn test_single_url_outside_run() {
    let server = MockServer::start().await;
    mount_page(&server, "/one", "<h1>One</h1>").await;

    let config = create_test_config(vec![format!("{}/", server.uri())]);
    let orchestrator = Orchestrator::from_config(config, EventSink::disconnected()).unwrap();

    let result = orchestrator
        .test_single_url(&format!("{}/one", server.uri()))
        .await;
    assert!(result.success);
    assert_eq!(orchestrator.state(), RunState::Idle);
}
