//! Output module for rendering run results
//!
//! This module handles:
//! - Accumulating and printing run statistics
//! - Rendering results and events as JSON lines
//! - Printing proxy pool statistics

pub mod stats;

pub use stats::{print_summary, RunSummary};

use crate::proxy::{PoolStats, ProxyRecord};
use serde::Serialize;

/// Serializes a value as a single JSON line
///
/// # Arguments
///
/// * `value` - Any serializable value (results, events, probe output)
///
/// # Returns
///
/// * `Ok(String)` - Compact JSON without a trailing newline
/// * `Err(serde_json::Error)` - The value could not be serialized
pub fn to_json_line<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string(value)
}

/// Prints proxy health to stdout
///
/// # Arguments
///
/// * `stats` - Pool totals
/// * `records` - Per-proxy state
pub fn print_proxy_report(stats: &PoolStats, records: &[ProxyRecord]) {
    println!("=== Proxy Pool ===\n");
    println!(
        "  Total: {}  Healthy: {}  Unhealthy: {}",
        stats.total, stats.healthy, stats.unhealthy
    );
    if let Some(avg) = stats.average_latency_ms {
        println!("  Average latency: {:.2}ms", avg);
    }
    println!();

    for record in records {
        let status = if record.healthy { "ok" } else { "down" };
        match (&record.last_latency_ms, &record.last_error) {
            (_, Some(error)) => println!("  [{}] {} ({})", status, record.address, error),
            (Some(latency), None) => {
                println!("  [{}] {} ({}ms)", status, record.address, latency)
            }
            (None, None) => println!("  [{}] {}", status, record.address),
        }
    }
}
