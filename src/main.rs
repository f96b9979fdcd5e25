//! Sumi-Extract main entry point
//!
//! This is the command-line interface for the Sumi-Extract page extractor.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use sumi_extract::config::{load_config_with_hash, Config};
use sumi_extract::crawler::{Event, EventSink, Orchestrator, RunControl, RunHandle};
use sumi_extract::engine::build_engine;
use sumi_extract::output::{print_proxy_report, print_summary, to_json_line};
use sumi_extract::proxy::ProxyPool;
use sumi_extract::SelectorKind;
use tracing_subscriber::EnvFilter;

/// What to do when a failure pauses the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OnPause {
    /// Prompt on stderr and read the decision from stdin
    Ask,
    Skip,
    Resume,
    Stop,
}

/// Sumi-Extract: selector-driven page extraction
///
/// Sumi-Extract fetches the pages a project file lists (or discovers by
/// following links), applies CSS/XPath field rules and prints one JSON record
/// per page, while respecting robots.txt, rate limits and proxy health.
#[derive(Parser, Debug)]
#[command(name = "sumi-extract")]
#[command(version = "1.0.0")]
#[command(about = "Selector-driven page extraction", long_about = None)]
struct Cli {
    /// Path to TOML project file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate the project and show what would be scraped
    #[arg(long, conflicts_with_all = ["check_proxies", "probe", "test_url"])]
    dry_run: bool,

    /// Health-check the configured proxies and exit
    #[arg(long, conflicts_with_all = ["dry_run", "probe", "test_url"])]
    check_proxies: bool,

    /// Count and sample the elements a selector matches, then exit
    #[arg(long, value_name = "SELECTOR", conflicts_with_all = ["dry_run", "check_proxies", "test_url"])]
    probe: Option<String>,

    /// Treat the probe selector as XPath
    #[arg(long, requires = "probe")]
    xpath: bool,

    /// Page to probe (defaults to the first seed URL)
    #[arg(long, value_name = "URL", requires = "probe")]
    url: Option<String>,

    /// Scrape a single URL with the project's rules and exit
    #[arg(long, value_name = "URL", conflicts_with_all = ["dry_run", "check_proxies", "probe"])]
    test_url: Option<String>,

    /// Decision taken when a failure pauses the run
    #[arg(long, value_enum, default_value_t = OnPause::Ask)]
    on_pause: OnPause,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading project from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Project loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load project: {}", e);
            return Err(e.into());
        }
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.check_proxies {
        handle_check_proxies(&config).await?;
    } else if let Some(selector) = &cli.probe {
        handle_probe(&config, selector, cli.xpath, cli.url.as_deref()).await?;
    } else if let Some(url) = &cli.test_url {
        handle_test_url(config, url).await?;
    } else {
        handle_run(config, cli.on_pause).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_extract=info,warn"),
            1 => EnvFilter::new("sumi_extract=debug,info"),
            2 => EnvFilter::new("sumi_extract=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows what a run would do
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Extract Dry Run: {} ===\n", config.name);

    println!("Target:");
    println!("  Site type: {:?}", config.target.site_type);
    println!("  Seed URLs: {}", config.target.urls.len());
    for url in config.target.urls.iter().take(20) {
        println!("    * {}", url);
    }
    if config.target.urls.len() > 20 {
        println!("    ... and {} more", config.target.urls.len() - 20);
    }

    println!("\nFields ({}):", config.fields.len());
    for field in &config.fields {
        let selectors: Vec<&str> = field.selectors().collect();
        match &field.attribute {
            Some(attr) => println!(
                "  - {} [{:?}] {} @{}",
                field.name,
                field.selector_kind,
                selectors.join(" | "),
                attr
            ),
            None => println!(
                "  - {} [{:?}] {}",
                field.name,
                field.selector_kind,
                selectors.join(" | ")
            ),
        }
    }

    println!("\nPoliteness:");
    println!(
        "  Delay: {}s - {}s (adaptive: {})",
        config.rate_limit.min_delay, config.rate_limit.max_delay, config.rate_limit.adaptive
    );
    println!("  Max concurrent: {}", config.rate_limit.max_concurrent);
    println!("  Respect robots.txt: {}", config.options.respect_robots);
    println!(
        "  Retries: {} (timeout {}s)",
        config.options.retry_count, config.options.timeout_seconds
    );
    println!("  Proxies: {}", config.proxy.proxies.len());

    if config.crawl.enabled {
        println!("\nCrawl:");
        println!("  Link selectors: {}", config.crawl.link_selectors.join(", "));
        println!("  Max pages: {}", config.crawl.max_pages);
        println!("  Same domain only: {}", config.crawl.same_domain_only);
    }

    println!("\n✓ Project is valid");
}

/// Handles the --check-proxies mode
async fn handle_check_proxies(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if config.proxy.proxies.is_empty() {
        println!("No proxies configured");
        return Ok(());
    }

    let pool = ProxyPool::new(config.proxy.proxies.iter().cloned())
        .with_failure_threshold(config.proxy.failure_threshold);

    tracing::info!(
        "Checking {} proxies against {}",
        pool.len(),
        config.proxy.health_check_url
    );
    pool.health_check_all(&config.proxy.health_check_url).await;

    print_proxy_report(&pool.stats(), &pool.snapshot());
    Ok(())
}

/// Handles the --probe mode
async fn handle_probe(
    config: &Config,
    selector: &str,
    xpath: bool,
    url: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(url) = url.or_else(|| config.target.urls.first().map(String::as_str)) else {
        return Err("No URL to probe: pass --url or configure a seed".into());
    };
    let kind = if xpath {
        SelectorKind::Xpath
    } else {
        SelectorKind::Css
    };

    let engine = build_engine(config, Arc::new(RunControl::new()))?;
    let probe = engine.probe_selector(url, selector, kind).await;
    engine.close().await;

    println!("{}", to_json_line(&probe)?);
    if let Some(error) = &probe.error {
        return Err(error.clone().into());
    }
    Ok(())
}

/// Handles the --test-url mode
async fn handle_test_url(config: Config, url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = Orchestrator::from_config(config, EventSink::disconnected())?;
    let result = orchestrator.test_single_url(url).await;
    orchestrator.close().await;

    println!("{}", to_json_line(&result)?);
    Ok(())
}

/// Handles the main run: prints results as JSON lines and answers pauses
async fn handle_run(config: Config, on_pause: OnPause) -> Result<(), Box<dyn std::error::Error>> {
    let (events, mut rx) = EventSink::channel();
    let orchestrator = Orchestrator::from_config(config, events)?;
    let handle = orchestrator.handle();

    tokio::spawn({
        let handle = handle.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping");
                handle.stop();
            }
        }
    });

    let run = tokio::spawn(async move {
        let outcome = orchestrator.run().await;
        orchestrator.close().await;
        outcome
    });

    while let Some(event) = rx.recv().await {
        match event {
            Event::Result(result) => println!("{}", to_json_line(&result)?),
            Event::Paused { reason, result } => {
                answer_pause(&handle, on_pause, &result.url, &reason).await;
            }
            Event::Completed(summary) => print_summary(&summary),
            Event::Error(message) => tracing::error!("{}", message),
            Event::Progress { .. } | Event::Log { .. } | Event::RobotsWarning(_) => {}
        }
    }

    match run.await? {
        Ok(summary) => {
            tracing::debug!("Run finished in state {}", summary.final_state);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}

async fn answer_pause(handle: &RunHandle, on_pause: OnPause, url: &str, reason: &str) {
    let decision = match on_pause {
        OnPause::Ask => {
            eprintln!("Paused on {}: {}", url, reason);
            eprint!("[r]esume, [s]kip, [q]uit? ");
            let line = tokio::task::spawn_blocking(|| {
                let mut line = String::new();
                std::io::stdin().read_line(&mut line).map(|_| line)
            })
            .await;

            match line {
                Ok(Ok(line)) => match line.trim().to_lowercase().as_str() {
                    "r" | "resume" => OnPause::Resume,
                    "s" | "skip" => OnPause::Skip,
                    _ => OnPause::Stop,
                },
                _ => OnPause::Stop,
            }
        }
        other => other,
    };

    match decision {
        OnPause::Resume => {
            handle.resume();
        }
        OnPause::Skip => {
            handle.skip_current();
        }
        OnPause::Stop | OnPause::Ask => handle.stop(),
    }
}
