//! Domain Layer - Market data types and pure business logic.
//!
//! Provider-agnostic types, the indicator math, and the subscription book.
//! Nothing here performs I/O.

/// Quotes, candle series, reference data, symbol normalization.
pub mod market;

/// Technical indicators over close series.
pub mod indicators;

/// Per-connection symbol sets with reference counting.
pub mod subscription;
