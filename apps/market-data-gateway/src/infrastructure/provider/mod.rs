//! Market Data Provider Adapter
//!
//! Implements `MarketDataPort` over a Finnhub-compatible REST API:
//!
//! - `client`: reqwest client, retry loop, status → error mapping
//! - `backoff`: exponential backoff with jitter
//! - `types`: wire payloads and conversion into domain types
//! - `status`: request outcome tracking for health reporting

pub mod backoff;
pub mod client;
pub mod status;
pub mod types;

pub use backoff::{RetryConfig, RetryPolicy};
pub use client::{DEFAULT_RETRY_AFTER_SECS, ProviderClient, ProviderConfig};
pub use status::{UpstreamSnapshot, UpstreamState, UpstreamStatus};
