use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Consecutive failures after which a proxy leaves rotation
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Default timeout for a single health-check request
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Health and usage of one proxy endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyRecord {
    pub address: String,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_latency_ms: Option<u64>,
    pub last_error: Option<String>,
}

impl ProxyRecord {
    fn new(address: String) -> Self {
        Self {
            address,
            healthy: true,
            consecutive_failures: 0,
            success_count: 0,
            failure_count: 0,
            last_latency_ms: None,
            last_error: None,
        }
    }
}

/// Aggregate view over the pool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub total_successes: u64,
    pub total_failures: u64,
    /// Mean of the last measured latency over proxies that have one
    pub average_latency_ms: Option<f64>,
}

#[derive(Debug, Default)]
struct PoolState {
    records: Vec<ProxyRecord>,
    cursor: usize,
}

/// Thread-safe pool of proxy endpoints with round-robin rotation
///
/// All mutation happens under one short-lived `std::sync::Mutex`; no lock is held
/// across an await point.
#[derive(Debug)]
pub struct ProxyPool {
    state: Mutex<PoolState>,
    rotate: bool,
    failure_threshold: u32,
    check_timeout: Duration,
}

impl Default for ProxyPool {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl ProxyPool {
    /// Creates a rotating pool with the default failure threshold
    ///
    /// Duplicate addresses are kept once.
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut records: Vec<ProxyRecord> = Vec::new();
        for address in addresses {
            let address = address.into();
            if !records.iter().any(|r| r.address == address) {
                records.push(ProxyRecord::new(address));
            }
        }

        Self {
            state: Mutex::new(PoolState { records, cursor: 0 }),
            rotate: true,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            check_timeout: HEALTH_CHECK_TIMEOUT,
        }
    }

    /// When disabled, `next()` always returns the first healthy proxy
    pub fn with_rotation(mut self, rotate: bool) -> Self {
        self.rotate = rotate;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Picks the proxy for the next request
    ///
    /// # Returns
    ///
    /// * `Some(address)` - A healthy proxy, in round-robin order
    /// * `None` - The pool is empty; connect directly
    ///
    /// If every proxy is unhealthy, all of them are reset to healthy first so a
    /// transient outage never locks the run out permanently.
    pub fn next(&self) -> Option<String> {
        let mut state = self.lock();
        if state.records.is_empty() {
            return None;
        }

        if !state.records.iter().any(|r| r.healthy) {
            tracing::warn!(
                "All {} proxies unhealthy, resetting pool",
                state.records.len()
            );
            for record in state.records.iter_mut() {
                record.healthy = true;
                record.consecutive_failures = 0;
            }
        }

        let healthy: Vec<usize> = state
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.healthy)
            .map(|(i, _)| i)
            .collect();

        let pick = if self.rotate {
            let pick = healthy[state.cursor % healthy.len()];
            state.cursor = state.cursor.wrapping_add(1);
            pick
        } else {
            healthy[0]
        };

        Some(state.records[pick].address.clone())
    }

    /// Resets the failure streak of a proxy and marks it healthy
    pub fn report_success(&self, address: &str) {
        let mut state = self.lock();
        if let Some(record) = state.records.iter_mut().find(|r| r.address == address) {
            record.success_count += 1;
            record.consecutive_failures = 0;
            record.healthy = true;
            record.last_error = None;
        }
    }

    /// Extends the failure streak of a proxy
    ///
    /// The proxy leaves rotation once the streak reaches the failure threshold.
    pub fn report_failure(&self, address: &str, reason: &str) {
        let mut state = self.lock();
        if let Some(record) = state.records.iter_mut().find(|r| r.address == address) {
            record.consecutive_failures += 1;
            record.failure_count += 1;
            record.last_error = Some(reason.to_string());

            if record.healthy && record.consecutive_failures >= self.failure_threshold {
                record.healthy = false;
                tracing::warn!(
                    "Proxy {} marked unhealthy after {} consecutive failures: {}",
                    address,
                    record.consecutive_failures,
                    reason
                );
            }
        }
    }

    /// Sends one GET through every proxy concurrently and records the outcome
    ///
    /// # Arguments
    ///
    /// * `target_url` - URL to request through each proxy
    ///
    /// # Returns
    ///
    /// Map of proxy address to whether the request succeeded with a 2xx status
    pub async fn health_check_all(&self, target_url: &str) -> HashMap<String, bool> {
        let addresses: Vec<String> = self.lock().records.iter().map(|r| r.address.clone()).collect();

        let checks = addresses.into_iter().map(|address| async move {
            let started = Instant::now();
            let outcome = check_proxy(&address, target_url, self.check_timeout).await;
            (address, outcome, started.elapsed())
        });

        let mut results = HashMap::new();
        for (address, outcome, elapsed) in join_all(checks).await {
            let mut state = self.lock();
            let Some(record) = state.records.iter_mut().find(|r| r.address == address) else {
                // Removed while the check was in flight
                continue;
            };

            match outcome {
                Ok(()) => {
                    record.healthy = true;
                    record.consecutive_failures = 0;
                    record.last_latency_ms = Some(elapsed.as_millis() as u64);
                    record.last_error = None;
                    tracing::debug!("Proxy {} healthy ({}ms)", address, elapsed.as_millis());
                }
                Err(e) => {
                    record.healthy = false;
                    record.last_error = Some(e.clone());
                    tracing::debug!("Proxy {} failed health check: {}", address, e);
                }
            }
            results.insert(address, record.healthy);
        }

        results
    }

    /// Copies of every record, in insertion order
    pub fn snapshot(&self) -> Vec<ProxyRecord> {
        self.lock().records.clone()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock();
        let total = state.records.len();
        let healthy = state.records.iter().filter(|r| r.healthy).count();
        let latencies: Vec<u64> = state
            .records
            .iter()
            .filter_map(|r| r.last_latency_ms)
            .collect();

        PoolStats {
            total,
            healthy,
            unhealthy: total - healthy,
            total_successes: state.records.iter().map(|r| r.success_count).sum(),
            total_failures: state.records.iter().map(|r| r.failure_count).sum(),
            average_latency_ms: if latencies.is_empty() {
                None
            } else {
                Some(latencies.iter().sum::<u64>() as f64 / latencies.len() as f64)
            },
        }
    }

    /// Adds a proxy; returns false if it was already present
    pub fn add(&self, address: impl Into<String>) -> bool {
        let address = address.into();
        let mut state = self.lock();
        if state.records.iter().any(|r| r.address == address) {
            return false;
        }
        state.records.push(ProxyRecord::new(address));
        true
    }

    /// Removes a proxy; returns false if it was not present
    pub fn remove(&self, address: &str) -> bool {
        let mut state = self.lock();
        let before = state.records.len();
        state.records.retain(|r| r.address != address);
        state.records.len() != before
    }

    /// Marks every proxy healthy and clears failure streaks and errors
    pub fn reset_all(&self) {
        for record in self.lock().records.iter_mut() {
            record.healthy = true;
            record.consecutive_failures = 0;
            record.last_error = None;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn check_proxy(address: &str, target_url: &str, timeout: Duration) -> Result<(), String> {
    let proxy = reqwest::Proxy::all(address).map_err(|e| format!("invalid proxy: {}", e))?;
    let client = reqwest::Client::builder()
        .proxy(proxy)
        .timeout(timeout)
        .build()
        .map_err(|e| e.to_string())?;

    let response = client
        .get(target_url)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(format!("HTTP {}", response.status().as_u16()))
    }
}
