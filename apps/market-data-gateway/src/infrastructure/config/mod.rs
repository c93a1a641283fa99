//! Configuration Module
//!
//! Environment-driven configuration for the gateway.

mod settings;

pub use settings::{
    CacheSettings, ConfigError, Credentials, DEFAULT_BASE_URL, GatewayConfig, RealtimeSettings,
    ServerSettings,
};
