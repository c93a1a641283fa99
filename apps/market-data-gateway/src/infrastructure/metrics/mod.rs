//! Prometheus Metrics Module
//!
//! Exposes gateway metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Upstream**: Provider requests by endpoint and outcome, latency
//! - **Cache**: Lookups by key prefix and result, resident entries
//! - **Fan-out**: Quotes delivered, payloads dropped, symbol failures, tick duration
//! - **Connections**: Open push connections and watched symbols
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the already-installed handle.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed (for example when
/// another global recorder is already present).
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Upstream
    describe_counter!(
        "market_gateway_upstream_requests_total",
        "Provider requests by endpoint and outcome"
    );
    describe_histogram!(
        "market_gateway_upstream_request_seconds",
        "Provider request latency including retries"
    );

    // Cache
    describe_counter!(
        "market_gateway_cache_lookups_total",
        "Cache lookups by key prefix and result"
    );
    describe_gauge!(
        "market_gateway_cache_entries",
        "Entries resident in the cache after the last sweep"
    );

    // Fan-out
    describe_counter!(
        "market_gateway_fanout_quotes_delivered_total",
        "Quotes pushed to connections"
    );
    describe_counter!(
        "market_gateway_fanout_payloads_dropped_total",
        "Payloads dropped because a connection outbox was full"
    );
    describe_counter!(
        "market_gateway_fanout_symbol_failures_total",
        "Symbols that failed to resolve during a tick"
    );
    describe_histogram!(
        "market_gateway_fanout_tick_seconds",
        "Duration of one fan-out tick"
    );

    // Connections
    describe_gauge!(
        "market_gateway_connections",
        "Open realtime connections"
    );
    describe_gauge!(
        "market_gateway_active_symbols",
        "Distinct symbols with at least one watcher"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Provider endpoint label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `/quote`.
    Quote,
    /// `/stock/candle`.
    Candles,
    /// `/stock/profile2`.
    Profile,
    /// `/stock/metric`.
    Metrics,
    /// `/search`.
    Search,
}

impl Endpoint {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Candles => "candles",
            Self::Profile => "profile",
            Self::Metrics => "metrics",
            Self::Search => "search",
        }
    }
}

/// Cache lookup result label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheResult {
    /// Fresh entry served.
    Hit,
    /// Caller started an upstream fetch.
    Miss,
    /// Caller joined a fetch already in flight.
    Coalesced,
}

impl CacheResult {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Coalesced => "coalesced",
        }
    }
}

/// Record one provider request and its total latency.
pub fn record_upstream_request(endpoint: Endpoint, outcome: &'static str, elapsed: Duration) {
    counter!(
        "market_gateway_upstream_requests_total",
        "endpoint" => endpoint.as_str(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        "market_gateway_upstream_request_seconds",
        "endpoint" => endpoint.as_str()
    )
    .record(elapsed.as_secs_f64());
}

/// Record a cache lookup for a key prefix.
pub fn record_cache_lookup(prefix: &str, result: CacheResult) {
    counter!(
        "market_gateway_cache_lookups_total",
        "prefix" => prefix.to_string(),
        "result" => result.as_str()
    )
    .increment(1);
}

/// Update resident cache entries for a cache.
pub fn set_cache_entries(cache: &'static str, count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("market_gateway_cache_entries", "cache" => cache).set(count as f64);
}

/// Record quotes pushed during a tick.
pub fn record_quotes_delivered(count: u64) {
    counter!("market_gateway_fanout_quotes_delivered_total").increment(count);
}

/// Record payloads dropped for slow consumers.
pub fn record_payloads_dropped(count: u64) {
    counter!("market_gateway_fanout_payloads_dropped_total").increment(count);
}

/// Record symbols that failed to resolve during a tick.
pub fn record_symbol_failures(count: u64) {
    counter!("market_gateway_fanout_symbol_failures_total").increment(count);
}

/// Record fan-out tick duration.
pub fn record_tick_duration(duration: Duration) {
    histogram!("market_gateway_fanout_tick_seconds").record(duration.as_secs_f64());
}

/// Update open connection and watched symbol gauges.
pub fn set_registry_size(connections: usize, symbols: usize) {
    #[allow(clippy::cast_precision_loss)]
    {
        gauge!("market_gateway_connections").set(connections as f64);
        gauge!("market_gateway_active_symbols").set(symbols as f64);
    }
}

// =============================================================================
// Tests
// =============================================================================
