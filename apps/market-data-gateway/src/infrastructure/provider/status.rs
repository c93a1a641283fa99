//! Upstream provider health as observed by the adapter.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::application::ports::MarketDataError;

/// Coarse provider state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamState {
    /// Last call succeeded (or none made yet).
    Ok,
    /// Last call failed or was rate limited.
    Degraded,
    /// Provider rejected the credential.
    Unauthorized,
}

/// Serializable view for the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamSnapshot {
    /// Coarse state.
    pub state: UpstreamState,
    /// Logical requests made.
    pub requests: u64,
    /// Logical requests that failed.
    pub failures: u64,
    /// When the last call succeeded.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Last failure message.
    pub last_error: Option<String>,
}

/// Shared, lock-light request outcome tracker.
#[derive(Debug, Default)]
pub struct UpstreamStatus {
    requests: AtomicU64,
    failures: AtomicU64,
    last_failed: AtomicBool,
    rate_limited: AtomicBool,
    unauthorized: AtomicBool,
    last_success_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
}

impl UpstreamStatus {
    /// Fresh tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one logical request.
    ///
    /// `NotFound` and `InvalidInput` are answers, not provider faults, and
    /// count as success.
    pub fn record(&self, result: Result<(), &MarketDataError>) {
        self.requests.fetch_add(1, Ordering::Relaxed);

        match result {
            Ok(()) | Err(MarketDataError::NotFound | MarketDataError::InvalidInput { .. }) => {
                self.last_failed.store(false, Ordering::Relaxed);
                self.rate_limited.store(false, Ordering::Relaxed);
                self.unauthorized.store(false, Ordering::Relaxed);
                *self.last_success_at.write() = Some(Utc::now());
            }
            Err(error) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                self.last_failed.store(true, Ordering::Relaxed);
                self.rate_limited.store(
                    matches!(error, MarketDataError::RateLimited { .. }),
                    Ordering::Relaxed,
                );
                self.unauthorized.store(
                    matches!(error, MarketDataError::Unauthorized),
                    Ordering::Relaxed,
                );
                *self.last_error.write() = Some(error.to_string());
            }
        }
    }

    /// Coarse state.
    #[must_use]
    pub fn state(&self) -> UpstreamState {
        if self.unauthorized.load(Ordering::Relaxed) {
            UpstreamState::Unauthorized
        } else if self.last_failed.load(Ordering::Relaxed) || self.rate_limited.load(Ordering::Relaxed)
        {
            UpstreamState::Degraded
        } else {
            UpstreamState::Ok
        }
    }

    /// Point-in-time copy.
    #[must_use]
    pub fn snapshot(&self) -> UpstreamSnapshot {
        UpstreamSnapshot {
            state: self.state(),
            requests: self.requests.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            last_success_at: *self.last_success_at.read(),
            last_error: self.last_error.read().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_ok() {
        let status = UpstreamStatus::new();
        assert_eq!(status.state(), UpstreamState::Ok);
        assert_eq!(status.snapshot().requests, 0);
    }

    #[test]
    fn unauthorized_then_recovers() {
        let status = UpstreamStatus::new();
        status.record(Err(&MarketDataError::Unauthorized));
        assert_eq!(status.state(), UpstreamState::Unauthorized);

        status.record(Ok(()));
        assert_eq!(status.state(), UpstreamState::Ok);
        let snapshot = status.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.failures, 1);
        assert!(snapshot.last_success_at.is_some());
    }

    #[test]
    fn rate_limit_degrades() {
        let status = UpstreamStatus::new();
        status.record(Err(&MarketDataError::RateLimited {
            retry_after_secs: 60,
        }));
        assert_eq!(status.state(), UpstreamState::Degraded);
    }

    #[test]
    fn not_found_is_not_a_fault() {
        let status = UpstreamStatus::new();
        status.record(Err(&MarketDataError::NotFound));
        assert_eq!(status.state(), UpstreamState::Ok);
        assert_eq!(status.snapshot().failures, 0);
    }
}
