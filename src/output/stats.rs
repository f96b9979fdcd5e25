//! Run statistics
//!
//! This module accumulates per-URL outcomes into a [`RunSummary`] and renders it
//! for the terminal.

use crate::crawler::RunState;
use crate::engine::FetchResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Totals for one orchestrator run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Successful results kept in the stream (duplicates included)
    pub succeeded: u64,

    /// Results kept in the stream, successful or not
    pub attempted: u64,

    /// Results discarded by a skip decision
    pub skipped: u64,

    /// Successful results flagged as duplicate content
    pub duplicates: u64,

    /// Failed results by error kind
    pub failures_by_kind: BTreeMap<String, u64>,

    pub final_state: RunState,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self {
            succeeded: 0,
            attempted: 0,
            skipped: 0,
            duplicates: 0,
            failures_by_kind: BTreeMap::new(),
            final_state: RunState::Idle,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a result that is being kept
    pub fn record(&mut self, result: &FetchResult) {
        self.attempted += 1;
        if result.success {
            self.succeeded += 1;
            if result.is_duplicate() {
                self.duplicates += 1;
            }
        } else {
            let kind = result
                .error_kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            *self.failures_by_kind.entry(kind).or_insert(0) += 1;
        }
    }

    /// Counts a result discarded by a skip decision
    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn failed(&self) -> u64 {
        self.attempted - self.succeeded
    }

    /// Stamps the end of the run
    pub fn finish(&mut self, state: RunState) {
        self.final_state = state;
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_seconds())
    }

    /// One-line summary, e.g. `Scrape completed: 8/10 successful`
    pub fn headline(&self) -> String {
        let verb = match self.final_state {
            RunState::Stopped => "stopped",
            _ => "completed",
        };
        format!(
            "Scrape {}: {}/{} successful",
            verb, self.succeeded, self.attempted
        )
    }
}

/// Prints a summary to stdout in a formatted manner
///
/// # Arguments
///
/// * `summary` - The summary to display
pub fn print_summary(summary: &RunSummary) {
    println!("=== Run Summary ===\n");

    println!("{}", summary.headline());
    println!("  Final state: {}", summary.final_state);
    if let Some(seconds) = summary.duration_seconds() {
        println!("  Duration: {}s", seconds);
    }
    println!("  Succeeded: {}", summary.succeeded);
    println!("  Failed: {}", summary.failed());
    println!("  Skipped: {}", summary.skipped);
    println!("  Duplicates: {}", summary.duplicates);
    println!();

    if !summary.failures_by_kind.is_empty() {
        println!("Failures by Kind:");
        let mut counts: Vec<_> = summary.failures_by_kind.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1));

        for (kind, count) in counts {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    let success_rate = if summary.attempted > 0 {
        (summary.succeeded as f64 / summary.attempted as f64) * 100.0
    } else {
        0.0
    };
    println!("Success Rate: {:.1}%", success_rate);
}
