//! Retry Backoff
//!
//! Exponential backoff with jitter for transient provider failures.
//! A policy is created per logical request and consulted after each
//! retryable failure.

use std::time::Duration;

use rand::Rng;

/// Retry behavior for provider calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = single attempt).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay, before jitter.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.2 = ±20%).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    /// No retries and no delay; used by tests that want the first failure.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }
}

/// Backoff state for one logical request.
///
/// ```rust
/// use market_data_gateway::infrastructure::provider::backoff::{RetryConfig, RetryPolicy};
/// use std::time::Duration;
///
/// let mut policy = RetryPolicy::new(RetryConfig {
///     max_retries: 2,
///     initial_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(1),
///     multiplier: 2.0,
///     jitter_factor: 0.0,
/// });
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(200)));
/// assert_eq!(policy.next_delay(), None);
/// ```
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    current_delay: Duration,
    retries: u32,
}

impl RetryPolicy {
    /// Fresh policy.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            current_delay,
            retries: 0,
        }
    }

    /// Delay before the next retry, or `None` when retries are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.retries >= self.config.max_retries {
            return None;
        }
        self.retries += 1;

        let delay = self.apply_jitter(self.current_delay.min(self.config.max_delay));

        let scaled = self.current_delay.as_secs_f64() * self.config.multiplier;
        let capped = if scaled.is_finite() && scaled > 0.0 {
            scaled.min(self.config.max_delay.as_secs_f64())
        } else {
            0.0
        };
        self.current_delay = Duration::from_secs_f64(capped);

        Some(delay)
    }

    /// Total attempts made so far, counting the first.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.retries + 1
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 || duration.is_zero() {
            return duration;
        }

        let base = duration.as_secs_f64();
        let range = base * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-range..=range);
        Duration::from_secs_f64((base + jitter).max(0.0))
    }
}
