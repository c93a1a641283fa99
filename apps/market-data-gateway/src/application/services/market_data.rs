//! Market Data Service
//!
//! Pull-side use cases behind the HTTP handlers. Every read goes through a
//! per-type [`TtlCache`] keyed by endpoint and parameters, falling back to
//! the upstream port on a miss.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{MarketDataError, MarketDataPort};
use crate::application::services::TtlCache;
use crate::domain::indicators::IndicatorBundle;
use crate::domain::market::{
    CandleSeries, CompanyMetrics, CompanyProfile, Comparison, HistoryPeriod, Quote, Symbol,
    SymbolMatch, normalize_symbol,
};

// =============================================================================
// Cache Policy
// =============================================================================

/// TTL per cache key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// `quote:*`
    pub quote_ttl: Duration,
    /// `candles:*`
    pub candles_ttl: Duration,
    /// `profile:*`
    pub profile_ttl: Duration,
    /// `metrics:*`
    pub metrics_ttl: Duration,
    /// `search:*`
    pub search_ttl: Duration,
    /// `compare:*`
    pub compare_ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            quote_ttl: Duration::from_secs(60),
            candles_ttl: Duration::from_secs(300),
            profile_ttl: Duration::from_secs(3600),
            metrics_ttl: Duration::from_secs(3600),
            search_ttl: Duration::from_secs(300),
            compare_ttl: Duration::from_secs(300),
        }
    }
}

/// Candles plus the indicators derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalData {
    /// Symbol.
    pub symbol: Symbol,
    /// Requested period.
    pub period: HistoryPeriod,
    /// Raw candles.
    pub candles: CandleSeries,
    /// Indicators recomputed from `candles` on every request.
    pub indicators: IndicatorBundle,
}

// =============================================================================
// Service
// =============================================================================

/// Cached access to the upstream provider.
pub struct MarketDataService {
    port: Arc<dyn MarketDataPort>,
    policy: CachePolicy,
    quotes: TtlCache<Quote>,
    candles: TtlCache<CandleSeries>,
    profiles: TtlCache<CompanyProfile>,
    metrics: TtlCache<CompanyMetrics>,
    searches: TtlCache<Vec<SymbolMatch>>,
    comparisons: TtlCache<Vec<Comparison>>,
}

impl std::fmt::Debug for MarketDataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataService")
            .field("policy", &self.policy)
            .field("cache_entries", &self.cache_entries())
            .finish_non_exhaustive()
    }
}

impl MarketDataService {
    /// Create a service over `port` with empty caches.
    #[must_use]
    pub fn new(port: Arc<dyn MarketDataPort>, policy: CachePolicy) -> Self {
        Self {
            port,
            policy,
            quotes: TtlCache::new("quote"),
            candles: TtlCache::new("candles"),
            profiles: TtlCache::new("profile"),
            metrics: TtlCache::new("metrics"),
            searches: TtlCache::new("search"),
            comparisons: TtlCache::new("compare"),
        }
    }

    /// Active cache policy.
    #[must_use]
    pub const fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Latest quote for one symbol.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a malformed symbol; otherwise the upstream error.
    pub async fn get_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let symbol = parse_symbol(symbol)?;
        let port = Arc::clone(&self.port);
        let key = format!("quote:{symbol}");

        self.quotes
            .get_or_fetch(&key, self.policy.quote_ttl, move || async move {
                port.fetch_quote(&symbol).await
            })
            .await
    }

    /// Quotes for many symbols, in request order, duplicates collapsed.
    ///
    /// Symbols that are malformed or fail upstream are omitted.
    pub async fn get_quotes(&self, symbols: &[String]) -> Vec<Quote> {
        let symbols = dedupe(symbols);
        let results = join_all(symbols.iter().map(|s| self.get_quote(s))).await;

        symbols
            .iter()
            .zip(results)
            .filter_map(|(symbol, result)| match result {
                Ok(quote) => Some(quote),
                Err(error) => {
                    tracing::debug!(symbol = %symbol, error = %error, "Omitting quote from batch");
                    None
                }
            })
            .collect()
    }

    /// Candles for `period` ending now, plus indicators.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a malformed symbol; otherwise the upstream error.
    pub async fn get_history(
        &self,
        symbol: &str,
        period: HistoryPeriod,
    ) -> Result<HistoricalData, MarketDataError> {
        let symbol = parse_symbol(symbol)?;
        let candles = load_candles(
            Arc::clone(&self.port),
            &self.candles,
            self.policy.candles_ttl,
            symbol.clone(),
            period,
        )
        .await?;
        let indicators = IndicatorBundle::from_series(&candles);

        Ok(HistoricalData {
            symbol,
            period,
            candles,
            indicators,
        })
    }

    /// Symbol search.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty query; otherwise the upstream error.
    pub async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>, MarketDataError> {
        let query = query.trim().to_string();
        if query.is_empty() {
            return Err(MarketDataError::invalid("search query is empty"));
        }
        let port = Arc::clone(&self.port);
        let key = format!("search:{}", query.to_lowercase());

        self.searches
            .get_or_fetch(&key, self.policy.search_ttl, move || async move {
                port.search_symbols(&query).await
            })
            .await
    }

    /// Company profile.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a malformed symbol; otherwise the upstream error.
    pub async fn profile(&self, symbol: &str) -> Result<CompanyProfile, MarketDataError> {
        let symbol = parse_symbol(symbol)?;
        let port = Arc::clone(&self.port);
        let key = format!("profile:{symbol}");

        self.profiles
            .get_or_fetch(&key, self.policy.profile_ttl, move || async move {
                port.fetch_profile(&symbol).await
            })
            .await
    }

    /// Company fundamentals.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a malformed symbol; otherwise the upstream error.
    pub async fn metrics(&self, symbol: &str) -> Result<CompanyMetrics, MarketDataError> {
        let symbol = parse_symbol(symbol)?;
        let port = Arc::clone(&self.port);
        let key = format!("metrics:{symbol}");

        self.metrics
            .get_or_fetch(&key, self.policy.metrics_ttl, move || async move {
                port.fetch_metrics(&symbol).await
            })
            .await
    }

    /// Performance of several symbols over `period`.
    ///
    /// Symbols that fail or have no candles are omitted. A result is cached
    /// when at least one symbol resolved.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when no valid symbol was given; the first upstream
    /// error when every symbol failed.
    pub async fn compare(
        &self,
        symbols: &[String],
        period: HistoryPeriod,
    ) -> Result<Vec<Comparison>, MarketDataError> {
        let symbols: Vec<Symbol> = dedupe(symbols)
            .into_iter()
            .filter_map(|s| normalize_symbol(&s).ok())
            .collect();
        if symbols.is_empty() {
            return Err(MarketDataError::invalid("no valid symbols to compare"));
        }

        let key = format!("compare:{period}:{}", symbols.join(","));
        let port = Arc::clone(&self.port);
        let candles = self.candles.clone();
        let ttl = self.policy.candles_ttl;

        self.comparisons
            .get_or_fetch(&key, self.policy.compare_ttl, move || async move {
                let loads = symbols.iter().map(|symbol| {
                    load_candles(Arc::clone(&port), &candles, ttl, symbol.clone(), period)
                });
                let results = join_all(loads).await;

                let mut first_error = None;
                let mut out = Vec::with_capacity(results.len());
                for result in results {
                    match result {
                        Ok(series) => out.extend(Comparison::from_series(&series)),
                        Err(error) => {
                            first_error.get_or_insert(error);
                        }
                    }
                }

                match first_error {
                    Some(error) if out.is_empty() => Err(error),
                    _ => Ok(out),
                }
            })
            .await
    }

    /// Resident entries across all caches.
    #[must_use]
    pub fn cache_entries(&self) -> usize {
        self.quotes.len()
            + self.candles.len()
            + self.profiles.len()
            + self.metrics.len()
            + self.searches.len()
            + self.comparisons.len()
    }

    /// Start one sweeper per cache.
    pub fn spawn_sweepers(
        &self,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        vec![
            self.quotes.spawn_sweeper(interval, cancel.clone()),
            self.candles.spawn_sweeper(interval, cancel.clone()),
            self.profiles.spawn_sweeper(interval, cancel.clone()),
            self.metrics.spawn_sweeper(interval, cancel.clone()),
            self.searches.spawn_sweeper(interval, cancel.clone()),
            self.comparisons.spawn_sweeper(interval, cancel.clone()),
        ]
    }
}

/// Read candles for `period` through the candle cache.
async fn load_candles(
    port: Arc<dyn MarketDataPort>,
    cache: &TtlCache<CandleSeries>,
    ttl: Duration,
    symbol: Symbol,
    period: HistoryPeriod,
) -> Result<CandleSeries, MarketDataError> {
    let key = format!("candles:{symbol}:{period}");
    cache
        .get_or_fetch(&key, ttl, move || async move {
            // Window computed when the fetch actually runs.
            let (from, to) = period.window(Utc::now());
            port.fetch_candles(&symbol, period.resolution(), from, to)
                .await
        })
        .await
}

fn parse_symbol(raw: &str) -> Result<Symbol, MarketDataError> {
    normalize_symbol(raw).map_err(|e| MarketDataError::invalid(e.to_string()))
}

/// Upper-cased, trimmed, first occurrence wins.
fn dedupe(symbols: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    symbols
        .iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
