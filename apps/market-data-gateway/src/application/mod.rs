//! Application Layer - Use cases and port definitions.
//!
//! The upstream port, the read-through cache, the market data service used
//! by request handlers, and the push side (connection registry and fan-out
//! scheduler).

/// Port interfaces for external systems.
pub mod ports;

/// Application services: caching, request use cases, push distribution.
pub mod services;
