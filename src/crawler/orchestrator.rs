//! Run orchestration
//!
//! The [`Orchestrator`] walks the frontier one page at a time, hands each URL to the
//! engine, pauses on failures that need a decision and reports everything as
//! [`Event`]s. Pages are visited sequentially so results arrive in breadth-first
//! order.

use super::control::{Decision, RunControl, RunHandle, RunState};
use super::events::{Event, EventSink};
use super::frontier::CrawlFrontier;
use crate::config::{Config, PauseOn};
use crate::engine::{build_engine, ErrorKind, FetchEngine, FetchResult};
use crate::output::RunSummary;
use crate::url::parse_http_url;
use crate::{HarvestError, Result};
use std::sync::Arc;
use url::Url;

/// Decides whether a result pauses the run
pub type PausePredicate = Arc<dyn Fn(&FetchResult) -> bool + Send + Sync>;

/// Builds the pause predicate for a configured policy
///
/// Cancelled fetches never pause.
pub fn pause_predicate(policy: PauseOn) -> PausePredicate {
    match policy {
        PauseOn::ClientErrors => Arc::new(|result: &FetchResult| {
            !result.success && result.error_kind.map(|k| k.is_client_error()).unwrap_or(false)
        }),
        PauseOn::AnyFailure => Arc::new(|result: &FetchResult| {
            !result.success && result.error_kind != Some(ErrorKind::Cancelled)
        }),
        PauseOn::Never => Arc::new(|_: &FetchResult| false),
    }
}

/// Drives one scrape run from seeds to summary
pub struct Orchestrator {
    config: Config,
    engine: Arc<dyn FetchEngine>,
    control: Arc<RunControl>,
    events: EventSink,
    pause_when: PausePredicate,
}

impl Orchestrator {
    /// Creates an orchestrator around an existing engine
    ///
    /// `control` must be the one the engine was built with, so a stop also cancels
    /// in-flight fetches.
    pub fn new(
        config: Config,
        engine: Arc<dyn FetchEngine>,
        control: Arc<RunControl>,
        events: EventSink,
    ) -> Self {
        let pause_when = pause_predicate(config.options.pause_on);
        Self {
            config,
            engine,
            control,
            events,
            pause_when,
        }
    }

    /// Creates an orchestrator with the engine the configuration selects
    pub fn from_config(config: Config, events: EventSink) -> Result<Self> {
        let control = Arc::new(RunControl::new());
        let engine = build_engine(&config, control.clone())?;
        Ok(Self::new(config, engine, control, events))
    }

    /// Replaces the pause predicate
    pub fn with_pause_predicate(mut self, predicate: PausePredicate) -> Self {
        self.pause_when = predicate;
        self
    }

    /// Control surface for other tasks
    pub fn handle(&self) -> RunHandle {
        RunHandle::new(self.control.clone())
    }

    pub fn state(&self) -> RunState {
        self.control.state()
    }

    pub fn engine(&self) -> &Arc<dyn FetchEngine> {
        &self.engine
    }

    /// Runs to completion or until stopped
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run ended, normally or by stop
    /// * `Err(HarvestError::NoUrlsOrNoFields)` - Nothing to do; nothing was fetched
    /// * `Err(HarvestError::InvalidTransition)` - This orchestrator already ran
    pub async fn run(&self) -> Result<RunSummary> {
        self.check_preconditions()?;
        self.control.transition(RunState::Running)?;

        let seeds = self.seed_urls();
        let max_pages = if self.config.crawl.enabled {
            self.config.crawl.max_pages
        } else {
            seeds.len()
        };
        let mut frontier = CrawlFrontier::new(seeds, max_pages);
        let mut summary = RunSummary::new();

        self.events.info(format!(
            "Starting '{}': {} seed URL(s), up to {} page(s), {} engine",
            self.config.name,
            frontier.len(),
            max_pages,
            self.engine.name()
        ));

        while !self.control.is_stop_requested() {
            let Some(url) = frontier.next() else {
                break;
            };

            if let Some(warning) = self.engine.check_robots(url.as_str()).await {
                self.events.warn(warning.message.clone());
                self.events.emit(Event::RobotsWarning(warning));
            }

            let result = self.engine.scrape(url.as_str(), &self.config.fields).await;
            if self.control.is_stop_requested() {
                break;
            }

            if (self.pause_when)(&result) {
                match self.await_decision(&result).await? {
                    Decision::Resume => {}
                    Decision::Skip => {
                        summary.record_skip();
                        self.emit_progress(&frontier);
                        self.events.info(format!("Skipped {}", url));
                        continue;
                    }
                    Decision::Stop => break,
                }
            }

            summary.record(&result);
            self.emit_progress(&frontier);

            if self.config.crawl.enabled {
                self.expand(&mut frontier, &url, &result);
            }

            self.log_result(&result);
            self.events.emit(Event::Result(result));
        }

        let final_state = if self.control.is_stop_requested() {
            RunState::Stopped
        } else {
            RunState::Completed
        };
        self.control.transition(final_state)?;
        summary.finish(final_state);

        self.events.info(summary.headline());
        self.events.emit(Event::Completed(summary.clone()));
        Ok(summary)
    }

    /// Fetches a single URL outside of any run
    ///
    /// Robots warnings are emitted as usual; the frontier and run state are not
    /// touched.
    pub async fn test_single_url(&self, url: &str) -> FetchResult {
        if let Some(warning) = self.engine.check_robots(url).await {
            self.events.emit(Event::RobotsWarning(warning));
        }
        let result = self.engine.scrape(url, &self.config.fields).await;
        self.log_result(&result);
        result
    }

    /// Releases engine resources
    pub async fn close(&self) {
        self.engine.close().await;
    }

    fn check_preconditions(&self) -> Result<()> {
        let message = if self.config.target.urls.is_empty() {
            "No URLs to scrape"
        } else if self.config.fields.is_empty() {
            "No fields defined"
        } else {
            return Ok(());
        };

        self.events.emit(Event::Error(message.to_string()));
        Err(HarvestError::NoUrlsOrNoFields(message.to_string()))
    }

    fn seed_urls(&self) -> Vec<Url> {
        self.config
            .target
            .urls
            .iter()
            .filter_map(|raw| match parse_http_url(raw) {
                Ok(url) => Some(url),
                Err(e) => {
                    self.events.warn(format!("Ignoring seed {}: {}", raw, e));
                    None
                }
            })
            .collect()
    }

    async fn await_decision(&self, result: &FetchResult) -> Result<Decision> {
        self.control.pause()?;

        let reason = result
            .error
            .clone()
            .unwrap_or_else(|| "Fetch failed".to_string());
        self.events
            .warn(format!("Paused on {}: {}", result.url, reason));
        self.events.emit(Event::Paused {
            reason,
            result: result.clone(),
        });

        let decision = self.control.wait_for_decision().await;
        tracing::info!("Pause decision for {}: {:?}", result.url, decision);
        if decision != Decision::Stop {
            self.control.transition(RunState::Running)?;
        }
        Ok(decision)
    }

    fn emit_progress(&self, frontier: &CrawlFrontier) {
        self.events.emit(Event::Progress {
            current: frontier.pages_visited(),
            total: frontier.max_pages(),
        });
    }

    fn expand(&self, frontier: &mut CrawlFrontier, url: &Url, result: &FetchResult) {
        // Error pages kept for inspection are never followed
        let Some(html) = result.raw_html.as_ref().filter(|_| result.success) else {
            return;
        };
        let report = frontier.ingest_page(
            url,
            html,
            &self.config.crawl.link_selectors,
            self.config.crawl.same_domain_only,
        );
        if report.added > 0 {
            tracing::debug!("Queued {} new link(s) from {}", report.added, url);
        }
    }

    fn log_result(&self, result: &FetchResult) {
        if result.success {
            match result.error_kind {
                Some(kind) if kind.is_annotation() => self
                    .events
                    .info(format!("Scraped {} ({})", result.url, kind)),
                _ => self.events.info(format!("Scraped {}", result.url)),
            }
        } else {
            self.events.warn(format!(
                "Failed {}: {}",
                result.url,
                result.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FetchError, ProbeResult, RobotsWarning};
    use crate::extract::{ExtractedRecord, FieldRule, SelectorKind};
    use crate::proxy::ProxyPool;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Engine returning canned outcomes per URL
    #[derive(Default)]
    struct FakeEngine {
        outcomes: HashMap<String, (u16, String)>,
        disallowed: Vec<String>,
        visited: Mutex<Vec<String>>,
    }

    impl FakeEngine {
        fn page(mut self, url: &str, status: u16, html: &str) -> Self {
            self.outcomes
                .insert(url.to_string(), (status, html.to_string()));
            self
        }

        fn visited(&self) -> Vec<String> {
            self.visited.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FetchEngine for FakeEngine {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn scrape(&self, url: &str, _rules: &[FieldRule]) -> FetchResult {
            self.visited.lock().unwrap().push(url.to_string());
            match self.outcomes.get(url) {
                Some((200, html)) => {
                    let mut record = ExtractedRecord::new();
                    record.insert("title".to_string(), Some(url.to_string()));
                    let mut result = FetchResult::success(url, record, 200);
                    result.raw_html = Some(html.clone());
                    result
                }
                Some((status, html)) => FetchResult::failure(
                    url,
                    FetchError::http_status(*status, Some("Not Found"), Some(html.clone())),
                ),
                None => FetchResult::failure(url, FetchError::new(ErrorKind::Network, "down")),
            }
        }

        async fn check_robots(&self, url: &str) -> Option<RobotsWarning> {
            self.disallowed.iter().any(|d| d == url).then(|| RobotsWarning {
                url: url.to_string(),
                disallowed_paths: vec!["/".to_string()],
                message: "disallowed".to_string(),
            })
        }

        async fn probe_selector(&self, url: &str, selector: &str, _kind: SelectorKind) -> ProbeResult {
            ProbeResult {
                url: url.to_string(),
                selector: selector.to_string(),
                ..ProbeResult::default()
            }
        }

        fn proxy_pool(&self) -> Arc<ProxyPool> {
            Arc::new(ProxyPool::default())
        }

        async fn close(&self) {}
    }

    fn config(urls: &[&str]) -> Config {
        Config::new(
            urls.iter().map(|u| u.to_string()).collect(),
            vec![FieldRule::css("title", "h1")],
        )
    }

    fn orchestrator(config: Config, engine: FakeEngine) -> (Orchestrator, Arc<FakeEngine>, UnboundedReceiver<Event>) {
        let engine = Arc::new(engine);
        let (events, rx) = EventSink::channel();
        let orchestrator = Orchestrator::new(
            config,
            engine.clone(),
            Arc::new(RunControl::new()),
            events,
        );
        (orchestrator, engine, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn result_urls(events: &[Event]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Result(r) => Some(r.url.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_no_urls_is_reported_once() {
        let (orchestrator, engine, mut rx) = orchestrator(config(&[]), FakeEngine::default());

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, HarvestError::NoUrlsOrNoFields(_)));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::Error(_)));
        assert!(engine.visited().is_empty());
        assert_eq!(orchestrator.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn test_no_fields_is_reported() {
        let mut config = config(&["https://a.test/"]);
        config.fields.clear();
        let (orchestrator, _, _rx) = orchestrator(config, FakeEngine::default());
        assert!(matches!(
            orchestrator.run().await,
            Err(HarvestError::NoUrlsOrNoFields(_))
        ));
    }

    #[tokio::test]
    async fn test_seeds_visited_in_order() {
        let engine = FakeEngine::default()
            .page("https://a.test/1", 200, "")
            .page("https://a.test/2", 200, "");
        let (orchestrator, _, mut rx) =
            orchestrator(config(&["https://a.test/1", "https://a.test/2"]), engine);

        let summary = orchestrator.run().await.unwrap();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.final_state, RunState::Completed);

        let events = drain(&mut rx);
        assert_eq!(result_urls(&events), vec!["https://a.test/1", "https://a.test/2"]);
        assert!(matches!(events.last(), Some(Event::Completed(_))));
        assert!(events.iter().any(|e| matches!(
            e,
            Event::Progress { current: 2, total: 2 }
        )));
    }

    #[tokio::test]
    async fn test_crawl_follows_links_breadth_first() {
        let mut config = config(&["https://a.test/"]);
        config.crawl.enabled = true;
        config.crawl.link_selectors = vec!["a".to_string()];
        config.crawl.max_pages = 10;

        let engine = FakeEngine::default()
            .page("https://a.test/", 200, r#"<a href="/b">b</a><a href="/c">c</a>"#)
            .page("https://a.test/b", 200, r#"<a href="/d">d</a><a href="/">home</a>"#)
            .page("https://a.test/c", 200, "")
            .page("https://a.test/d", 200, "");
        let (orchestrator, engine, _rx) = orchestrator(config, engine);

        let summary = orchestrator.run().await.unwrap();
        assert_eq!(
            engine.visited(),
            vec!["https://a.test/", "https://a.test/b", "https://a.test/c", "https://a.test/d"]
        );
        assert_eq!(summary.attempted, 4);
    }

    #[tokio::test]
    async fn test_error_page_links_not_followed() {
        let mut config = config(&["https://a.test/"]);
        config.crawl.enabled = true;
        config.crawl.link_selectors = vec!["a".to_string()];

        let engine = FakeEngine::default()
            .page("https://a.test/", 404, r#"<a href="/help">help</a>"#)
            .page("https://a.test/help", 200, "");
        let (orchestrator, engine, _rx) = orchestrator(config, engine);
        let orchestrator = orchestrator.with_pause_predicate(pause_predicate(PauseOn::Never));

        orchestrator.run().await.unwrap();
        assert_eq!(engine.visited(), vec!["https://a.test/"]);
    }

    #[tokio::test]
    async fn test_robots_warning_does_not_block() {
        let mut engine = FakeEngine::default().page("https://a.test/", 200, "");
        engine.disallowed.push("https://a.test/".to_string());
        let (orchestrator, _, mut rx) = orchestrator(config(&["https://a.test/"]), engine);

        let summary = orchestrator.run().await.unwrap();
        assert_eq!(summary.succeeded, 1);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, Event::RobotsWarning(_))));
    }

    #[tokio::test]
    async fn test_client_error_pauses_then_resume_keeps_result() {
        let engine = FakeEngine::default()
            .page("https://a.test/missing", 404, "")
            .page("https://a.test/ok", 200, "");
        let (orchestrator, _, mut rx) =
            orchestrator(config(&["https://a.test/missing", "https://a.test/ok"]), engine);
        let handle = orchestrator.handle();

        let run = tokio::spawn(async move { orchestrator.run().await });

        loop {
            if let Some(Event::Paused { reason, .. }) = rx.recv().await {
                assert_eq!(reason, "HTTP 404: Not Found");
                break;
            }
        }
        assert!(handle.is_paused());
        assert!(handle.resume());

        let summary = run.await.unwrap().unwrap();
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped, 0);
    }

    #[tokio::test]
    async fn test_server_error_does_not_pause() {
        let engine = FakeEngine::default().page("https://a.test/", 503, "");
        let (orchestrator, _, _rx) = orchestrator(config(&["https://a.test/"]), engine);

        let summary = tokio::time::timeout(Duration::from_secs(2), orchestrator.run())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.failed(), 1);
    }

    #[tokio::test]
    async fn test_custom_pause_predicate() {
        let engine = FakeEngine::default().page("https://a.test/", 404, "");
        let (orchestrator, _, _rx) = orchestrator(config(&["https://a.test/"]), engine);
        let orchestrator = orchestrator.with_pause_predicate(pause_predicate(PauseOn::Never));

        let summary = orchestrator.run().await.unwrap();
        assert_eq!(summary.failed(), 1);
    }

    #[tokio::test]
    async fn test_stop_before_run() {
        let engine = FakeEngine::default().page("https://a.test/", 200, "");
        let (orchestrator, engine, _rx) = orchestrator(config(&["https://a.test/"]), engine);
        orchestrator.handle().stop();

        let summary = orchestrator.run().await.unwrap();
        assert_eq!(summary.final_state, RunState::Stopped);
        assert!(engine.visited().is_empty());
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let engine = FakeEngine::default().page("https://a.test/", 200, "");
        let (orchestrator, _, _rx) = orchestrator(config(&["https://a.test/"]), engine);

        orchestrator.run().await.unwrap();
        assert!(matches!(
            orchestrator.run().await,
            Err(HarvestError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_single_url_leaves_state_alone() {
        let engine = FakeEngine::default().page("https://a.test/x", 200, "");
        let (orchestrator, _, _rx) = orchestrator(config(&["https://a.test/"]), engine);

        let result = orchestrator.test_single_url("https://a.test/x").await;
        assert!(result.success);
        assert_eq!(orchestrator.state(), RunState::Idle);
    }

    #[test]
    fn test_pause_predicates() {
        let not_found = FetchResult::failure("u", FetchError::http_status(404, None, None));
        let unavailable = FetchResult::failure("u", FetchError::http_status(503, None, None));
        let cancelled = FetchResult::failure("u", FetchError::new(ErrorKind::Cancelled, "x"));

        let client = pause_predicate(PauseOn::ClientErrors);
        assert!(client(&not_found));
        assert!(!client(&unavailable));

        let any = pause_predicate(PauseOn::AnyFailure);
        assert!(any(&unavailable));
        assert!(!any(&cancelled));

        assert!(!pause_predicate(PauseOn::Never)(&not_found));
    }
}
