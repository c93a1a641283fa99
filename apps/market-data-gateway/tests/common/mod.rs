//! Shared fixtures for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use market_data_gateway::domain::market::{CandleColumns, SymbolMatch};
use market_data_gateway::{
    CachePolicy, CandleSeries, CompanyMetrics, CompanyProfile, ConnectionRegistry,
    MarketDataError, MarketDataPort, MarketDataService, Quote, Resolution,
};

/// In-memory provider with per-symbol answers and call counting.
#[derive(Default)]
pub struct FakeProvider {
    prices: Mutex<HashMap<String, Decimal>>,
    errors: Mutex<HashMap<String, MarketDataError>>,
    candle_delay: Mutex<Option<Duration>>,
    calls: Mutex<BTreeMap<String, usize>>,
    total: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer `symbol` with a quote at `price`.
    pub fn with_price(self: &Arc<Self>, symbol: &str, price: i64) -> Arc<Self> {
        self.prices
            .lock()
            .insert(symbol.to_string(), Decimal::from(price));
        Arc::clone(self)
    }

    /// Answer `symbol` with `error` on every call.
    pub fn with_error(self: &Arc<Self>, symbol: &str, error: MarketDataError) -> Arc<Self> {
        self.errors.lock().insert(symbol.to_string(), error);
        Arc::clone(self)
    }

    /// Delay every candle response.
    pub fn with_candle_delay(self: &Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.candle_delay.lock() = Some(delay);
        Arc::clone(self)
    }

    pub fn set_price(&self, symbol: &str, price: i64) {
        self.prices
            .lock()
            .insert(symbol.to_string(), Decimal::from(price));
    }

    /// Calls made for `"<op>:<symbol>"`, e.g. `"quote:AAPL"`.
    pub fn calls(&self, key: &str) -> usize {
        self.calls.lock().get(key).copied().unwrap_or(0)
    }

    /// Every call made.
    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    fn record(&self, op: &str, symbol: &str) -> Result<(), MarketDataError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.calls.lock().entry(format!("{op}:{symbol}")).or_default() += 1;
        match self.errors.lock().get(symbol) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn price(&self, symbol: &str) -> Result<Decimal, MarketDataError> {
        self.prices
            .lock()
            .get(symbol)
            .copied()
            .ok_or(MarketDataError::NotFound)
    }
}

pub fn quote(symbol: &str, price: Decimal) -> Quote {
    Quote {
        symbol: symbol.to_string(),
        current: price,
        open: price,
        high: price,
        low: price,
        previous_close: price,
        change: Decimal::ZERO,
        change_percent: Decimal::ZERO,
        volume: None,
        timestamp: Some(Utc::now()),
        fetched_at: Utc::now(),
    }
}

/// Sixty daily candles rising by one per day from `start`.
pub fn rising_series(symbol: &str, start: f64, resolution: Resolution) -> CandleSeries {
    let n = 60_i32;
    let timestamps: Vec<i64> = (0..n).map(|i| 1_700_000_000 + i64::from(i) * 86_400).collect();
    let close: Vec<f64> = (0..n).map(|i| start + f64::from(i)).collect();
    CandleSeries::from_columns(
        symbol.to_string(),
        resolution,
        CandleColumns {
            timestamps,
            open: close.clone(),
            high: close.iter().map(|c| c + 0.5).collect(),
            low: close.iter().map(|c| c - 0.5).collect(),
            volume: vec![1_000.0; close.len()],
            close,
        },
    )
    .unwrap()
}

#[async_trait]
impl MarketDataPort for FakeProvider {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        self.record("quote", symbol)?;
        Ok(quote(symbol, self.price(symbol)?))
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        resolution: Resolution,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<CandleSeries, MarketDataError> {
        let delay = *self.candle_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record("candles", symbol)?;
        let price = self.price(symbol)?;
        let start = price.to_string().parse::<f64>().unwrap();
        Ok(rising_series(symbol, start, resolution))
    }

    async fn fetch_profile(&self, symbol: &str) -> Result<CompanyProfile, MarketDataError> {
        self.record("profile", symbol)?;
        self.price(symbol)?;
        Ok(CompanyProfile {
            symbol: symbol.to_string(),
            name: format!("{symbol} Inc"),
            exchange: Some("NASDAQ".to_string()),
            currency: Some("USD".to_string()),
            country: Some("US".to_string()),
            industry: None,
            ipo: None,
            market_capitalization: None,
            shares_outstanding: None,
            logo: None,
            web_url: None,
        })
    }

    async fn fetch_metrics(&self, symbol: &str) -> Result<CompanyMetrics, MarketDataError> {
        self.record("metrics", symbol)?;
        self.price(symbol)?;
        Ok(CompanyMetrics {
            symbol: symbol.to_string(),
            metrics: BTreeMap::from([("beta".to_string(), 1.2)]),
        })
    }

    async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolMatch>, MarketDataError> {
        self.record("search", query)?;
        let query = query.to_uppercase();
        let known: HashSet<String> = self.prices.lock().keys().cloned().collect();
        let mut hits: Vec<SymbolMatch> = known
            .into_iter()
            .filter(|s| s.contains(&query))
            .map(|s| SymbolMatch {
                display_symbol: s.clone(),
                description: format!("{s} Inc"),
                security_type: "Common Stock".to_string(),
                symbol: s,
            })
            .collect();
        hits.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(hits)
    }
}

/// Service and registry over `provider`.
pub fn gateway(provider: &Arc<FakeProvider>) -> (Arc<MarketDataService>, Arc<ConnectionRegistry>) {
    let port: Arc<dyn MarketDataPort> = Arc::clone(provider) as Arc<dyn MarketDataPort>;
    (
        Arc::new(MarketDataService::new(port, CachePolicy::default())),
        Arc::new(ConnectionRegistry::new(8)),
    )
}
