use rand::Rng;
use std::time::Duration;

/// Longest delay the adaptive back-off will ever ask for
pub const MAX_ADAPTIVE_DELAY: Duration = Duration::from_secs(60);

/// Computes the politeness delay before each request
///
/// Pure: callers sleep. With no recent errors the delay is uniform in
/// `[min_delay, max_delay]`; in adaptive mode every consecutive error doubles
/// `max_delay`, capped at [`MAX_ADAPTIVE_DELAY`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiter {
    min_delay: Duration,
    max_delay: Duration,
    adaptive: bool,
}

impl RateLimiter {
    pub fn new(min_delay: Duration, max_delay: Duration, adaptive: bool) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
            adaptive,
        }
    }

    /// A limiter that never waits
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, false)
    }

    /// Delay to apply given the engine's current consecutive-error count
    pub fn delay(&self, consecutive_errors: u32) -> Duration {
        if self.adaptive && consecutive_errors > 0 {
            let factor = 2u32.saturating_pow(consecutive_errors.min(16));
            return self
                .max_delay
                .saturating_mul(factor)
                .min(MAX_ADAPTIVE_DELAY);
        }

        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }

        rand::thread_rng().gen_range(self.min_delay..=self.max_delay)
    }
}

/// Back-off before retry number `attempt + 1`: `base * 2^attempt`
pub fn retry_backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.min(16)))
}
