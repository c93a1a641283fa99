//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `TtlCache`: per-key expiry with single-flight read-through
//! - `MarketDataService`: cached pull use cases for the HTTP handlers
//! - `ConnectionRegistry`: live push connections and their outboxes
//! - `FanoutScheduler`: periodic quote push to registered connections

mod cache;
mod fanout;
mod market_data;
mod registry;

pub use cache::{CacheStats, TtlCache};
pub use fanout::{FanoutConfig, FanoutScheduler, TickReport};
pub use market_data::{CachePolicy, HistoricalData, MarketDataService};
pub use registry::{
    ConnectionRegistry, RegistryError, RegistrySnapshot, SendOutcome, ServerMessage,
};
