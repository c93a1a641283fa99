//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `MarketDataPort`: the single upstream market data provider

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::market::{
    CandleSeries, CompanyMetrics, CompanyProfile, Quote, Resolution, SymbolMatch,
};

/// Upstream market data error.
///
/// Cloneable so a single failed fetch can be handed to every caller
/// waiting on the same cache key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketDataError {
    /// Provider does not know the symbol.
    #[error("Symbol not found")]
    NotFound,

    /// Provider quota exhausted.
    #[error("Rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Provider rejected the credential.
    #[error("Market data provider rejected the API key")]
    Unauthorized,

    /// Provider unreachable, failing, or returning undecodable data.
    #[error("Market data unavailable: {message}")]
    UpstreamUnavailable {
        /// Error details.
        message: String,
    },

    /// Request was malformed.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Error details.
        message: String,
    },
}

impl MarketDataError {
    /// Shorthand for [`MarketDataError::UpstreamUnavailable`].
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            message: message.into(),
        }
    }

    /// Shorthand for [`MarketDataError::InvalidInput`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Stable label for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::RateLimited { .. } => "rate_limited",
            Self::Unauthorized => "unauthorized",
            Self::UpstreamUnavailable { .. } => "unavailable",
            Self::InvalidInput { .. } => "invalid_input",
        }
    }
}

/// Port for fetching market data from the upstream provider.
///
/// This is a driven (secondary/outbound) port. Implementations own retry
/// and timeout handling and never touch the cache.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Latest quote for one symbol.
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketDataError>;

    /// Candles for `symbol` between `from` and `to` (inclusive).
    ///
    /// A window without candles is `Ok` with a `no_data` series.
    async fn fetch_candles(
        &self,
        symbol: &str,
        resolution: Resolution,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<CandleSeries, MarketDataError>;

    /// Company profile.
    async fn fetch_profile(&self, symbol: &str) -> Result<CompanyProfile, MarketDataError>;

    /// Company fundamentals.
    async fn fetch_metrics(&self, symbol: &str) -> Result<CompanyMetrics, MarketDataError>;

    /// Free-text symbol search; no matches is an empty list.
    async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolMatch>, MarketDataError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_are_stable() {
        assert_eq!(MarketDataError::NotFound.kind(), "not_found");
        assert_eq!(
            MarketDataError::RateLimited {
                retry_after_secs: 5
            }
            .kind(),
            "rate_limited"
        );
        assert_eq!(MarketDataError::unavailable("x").kind(), "unavailable");
    }

    #[test]
    fn rate_limited_message_includes_delay() {
        let err = MarketDataError::RateLimited {
            retry_after_secs: 30,
        };
        assert_eq!(err.to_string(), "Rate limited, retry after 30 seconds");
    }
}
