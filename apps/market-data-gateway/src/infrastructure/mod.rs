//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus the driving
//! adapters (HTTP, WebSocket) and process plumbing.

/// Upstream market data provider adapter.
pub mod provider;

/// Public REST API.
pub mod http;

/// Realtime quote channel.
pub mod websocket;

/// Environment configuration.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing.
pub mod telemetry;
