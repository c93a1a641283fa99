//! Gateway Configuration Settings
//!
//! Configuration types for the gateway, loaded from environment variables.

use std::time::Duration;

use crate::application::services::{CachePolicy, FanoutConfig};
use crate::infrastructure::provider::{ProviderConfig, RetryConfig};

/// Default provider base URL.
pub const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";

/// Provider API token.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String) -> Self {
        Self { api_key }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Public HTTP API and WebSocket port.
    pub http_port: u16,
    /// Health check and metrics port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_port: 8080,
            health_port: 8082,
        }
    }
}

/// Cache settings.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// TTL per key prefix.
    pub policy: CachePolicy,
    /// Interval between expired-entry sweeps.
    pub sweep_interval: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            policy: CachePolicy::default(),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Realtime push settings.
#[derive(Debug, Clone, Default)]
pub struct RealtimeSettings {
    /// Fan-out tick settings.
    pub fanout: FanoutConfig,
    /// Messages buffered per connection before payloads are dropped.
    pub outbox_capacity: usize,
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Upstream provider.
    pub provider: ProviderConfig,
    /// Server ports.
    pub server: ServerSettings,
    /// Cache TTLs and sweeping.
    pub cache: CacheSettings,
    /// Realtime push.
    pub realtime: RealtimeSettings,
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `MARKET_DATA_API_KEY` is missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// Unparseable optional values fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `MARKET_DATA_API_KEY` is missing or empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let api_key = lookup("MARKET_DATA_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("MARKET_DATA_API_KEY".to_string()))?;
        if api_key.trim().is_empty() {
            return Err(ConfigError::EmptyValue("MARKET_DATA_API_KEY".to_string()));
        }

        let retry_defaults = RetryConfig::default();
        let provider = ProviderConfig {
            base_url: lookup("MARKET_DATA_BASE_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            credentials: Credentials::new(api_key.trim().to_string()),
            timeout: env.secs("MARKET_DATA_TIMEOUT_SECS", Duration::from_secs(10)),
            retry: RetryConfig {
                max_retries: env.parse("MARKET_DATA_MAX_RETRIES", retry_defaults.max_retries),
                initial_delay: env.millis(
                    "MARKET_DATA_RETRY_INITIAL_MS",
                    retry_defaults.initial_delay,
                ),
                max_delay: env.millis("MARKET_DATA_RETRY_MAX_MS", retry_defaults.max_delay),
                ..retry_defaults
            },
        };

        let server_defaults = ServerSettings::default();
        let server = ServerSettings {
            http_port: env.parse("GATEWAY_HTTP_PORT", server_defaults.http_port),
            health_port: env.parse("GATEWAY_HEALTH_PORT", server_defaults.health_port),
        };

        let ttl = CachePolicy::default();
        let cache = CacheSettings {
            policy: CachePolicy {
                quote_ttl: env.secs("GATEWAY_QUOTE_TTL_SECS", ttl.quote_ttl),
                candles_ttl: env.secs("GATEWAY_CANDLES_TTL_SECS", ttl.candles_ttl),
                profile_ttl: env.secs("GATEWAY_PROFILE_TTL_SECS", ttl.profile_ttl),
                metrics_ttl: env.secs("GATEWAY_METRICS_TTL_SECS", ttl.metrics_ttl),
                search_ttl: env.secs("GATEWAY_SEARCH_TTL_SECS", ttl.search_ttl),
                compare_ttl: env.secs("GATEWAY_COMPARE_TTL_SECS", ttl.compare_ttl),
            },
            sweep_interval: env.secs(
                "GATEWAY_CACHE_SWEEP_SECS",
                CacheSettings::default().sweep_interval,
            ),
        };

        let fanout = FanoutConfig::default();
        let realtime = RealtimeSettings {
            fanout: FanoutConfig {
                interval: env.secs("GATEWAY_FANOUT_INTERVAL_SECS", fanout.interval),
                concurrency: env.parse("GATEWAY_FANOUT_CONCURRENCY", fanout.concurrency).max(1),
            },
            outbox_capacity: env.parse("GATEWAY_OUTBOX_CAPACITY", 32_usize).max(1),
        };

        Ok(Self {
            provider,
            server,
            cache,
            realtime,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

/// Typed accessors over a variable lookup.
struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v > 0)
            .map_or(default, Duration::from_secs)
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
