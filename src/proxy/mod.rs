//! Proxy pool
//!
//! Tracks proxy endpoints, their health and the rotation order. Proxy trouble is
//! absorbed here: a failing proxy drops out of rotation and the pool resets itself
//! rather than leaving the run without any route.

mod pool;

pub use pool::{PoolStats, ProxyPool, ProxyRecord, DEFAULT_FAILURE_THRESHOLD};
