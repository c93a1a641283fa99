#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::cast_precision_loss
    )
)]

//! Market Data Gateway - Quote Cache and Fan-out
//!
//! Sits between many dashboard viewers and a single rate-limited market data
//! provider. Every upstream read goes through a TTL cache with single-flight
//! coalescing; live quotes are pushed to WebSocket subscribers on a fixed
//! interval with one upstream lookup per distinct symbol per tick.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and calculations
//!   - `market`: Quotes, candle series, periods, profiles, symbol rules
//!   - `indicators`: SMA, EMA, RSI, MACD
//!   - `subscription`: Per-connection symbol sets
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `MarketDataPort` and its error taxonomy
//!   - `services`: TTL cache, market data use cases, connection registry,
//!     fan-out scheduler
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `provider`: Finnhub-compatible REST client
//!   - `http`: REST handlers
//!   - `websocket`: Realtime channel
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                  ┌───────────────┐     ┌──────────┐
//! HTTP handlers ──►│ MarketData    │────►│ TtlCache │──► Provider REST
//!                  │ Service       │     └──────────┘
//!                  └───────▲───────┘
//!                          │ every tick, union of symbols
//!                  ┌───────┴───────┐     ┌────────────┐
//!                  │ Fan-out       │────►│ Connection │──► WS client 1
//!                  │ Scheduler     │     │ Registry   │──► WS client N
//!                  └───────────────┘     └────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Market types and indicator math with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market::{
    CandleSeries, CompanyMetrics, CompanyProfile, Comparison, HistoryPeriod, Quote, Resolution,
    Symbol, SymbolMatch,
};
pub use domain::subscription::ConnectionId;

// Ports and services
pub use application::ports::{MarketDataError, MarketDataPort};
pub use application::services::{
    CachePolicy, ConnectionRegistry, FanoutConfig, FanoutScheduler, HistoricalData,
    MarketDataService, ServerMessage, TickReport, TtlCache,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, Credentials, GatewayConfig};

// Provider adapter
pub use infrastructure::provider::{ProviderClient, ProviderConfig, RetryConfig, UpstreamStatus};

// HTTP and realtime
pub use infrastructure::http::{ApiServer, AppState, ServerError, create_router};
pub use infrastructure::websocket::ClientMessage;

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
