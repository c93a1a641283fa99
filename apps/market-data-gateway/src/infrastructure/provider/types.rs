//! Provider wire types (Finnhub-compatible REST) and their conversion into
//! domain types.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ports::MarketDataError;
use crate::domain::market::{
    CandleColumns, CandleSeries, CompanyMetrics, CompanyProfile, Quote, Resolution, SymbolMatch,
};

/// `GET /quote`
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteResponse {
    /// Current price.
    #[serde(rename = "c", default)]
    pub current: f64,
    /// Change.
    #[serde(rename = "d")]
    pub change: Option<f64>,
    /// Percent change.
    #[serde(rename = "dp")]
    pub change_percent: Option<f64>,
    /// High of day.
    #[serde(rename = "h", default)]
    pub high: f64,
    /// Low of day.
    #[serde(rename = "l", default)]
    pub low: f64,
    /// Open.
    #[serde(rename = "o", default)]
    pub open: f64,
    /// Previous close.
    #[serde(rename = "pc", default)]
    pub previous_close: f64,
    /// UNIX seconds of the last price.
    #[serde(rename = "t", default)]
    pub timestamp: i64,
    /// Volume; only some plans include it.
    #[serde(rename = "v")]
    pub volume: Option<f64>,
}

impl QuoteResponse {
    /// Convert, treating the all-zero answer as an unknown symbol.
    ///
    /// # Errors
    ///
    /// [`MarketDataError::NotFound`] when price and timestamp are both zero.
    pub fn into_quote(self, symbol: &str) -> Result<Quote, MarketDataError> {
        if self.current == 0.0 && self.timestamp == 0 {
            return Err(MarketDataError::NotFound);
        }

        let change = self.change.unwrap_or(self.current - self.previous_close);
        let change_percent = self.change_percent.unwrap_or_else(|| {
            if self.previous_close == 0.0 {
                0.0
            } else {
                change / self.previous_close * 100.0
            }
        });

        Ok(Quote {
            symbol: symbol.to_string(),
            current: decimal(self.current),
            open: decimal(self.open),
            high: decimal(self.high),
            low: decimal(self.low),
            previous_close: decimal(self.previous_close),
            change: decimal(change),
            change_percent: decimal(change_percent),
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            volume: self.volume.filter(|v| *v >= 0.0).map(|v| v as u64),
            timestamp: (self.timestamp > 0)
                .then(|| DateTime::from_timestamp(self.timestamp, 0))
                .flatten(),
            fetched_at: Utc::now(),
        })
    }
}

fn decimal(value: f64) -> Decimal {
    Decimal::try_from(value)
        .map(|d| d.round_dp(4))
        .unwrap_or(Decimal::ZERO)
}

/// `GET /stock/candle`
#[derive(Debug, Clone, Deserialize)]
pub struct CandleResponse {
    /// `ok` or `no_data`.
    #[serde(rename = "s")]
    pub status: String,
    /// Closes.
    #[serde(rename = "c", default)]
    pub close: Vec<f64>,
    /// Highs.
    #[serde(rename = "h", default)]
    pub high: Vec<f64>,
    /// Lows.
    #[serde(rename = "l", default)]
    pub low: Vec<f64>,
    /// Opens.
    #[serde(rename = "o", default)]
    pub open: Vec<f64>,
    /// Candle times (UNIX seconds).
    #[serde(rename = "t", default)]
    pub timestamps: Vec<i64>,
    /// Volumes.
    #[serde(rename = "v", default)]
    pub volume: Vec<f64>,
}

impl CandleResponse {
    /// Convert into a validated series.
    ///
    /// # Errors
    ///
    /// [`MarketDataError::UpstreamUnavailable`] for malformed columns or an
    /// unknown status.
    pub fn into_series(
        self,
        symbol: &str,
        resolution: Resolution,
    ) -> Result<CandleSeries, MarketDataError> {
        match self.status.as_str() {
            "no_data" => Ok(CandleSeries::no_data(symbol.to_string(), resolution)),
            "ok" => CandleSeries::from_columns(
                symbol.to_string(),
                resolution,
                CandleColumns {
                    timestamps: self.timestamps,
                    open: self.open,
                    high: self.high,
                    low: self.low,
                    close: self.close,
                    volume: self.volume,
                },
            )
            .map_err(|e| MarketDataError::unavailable(format!("malformed candles: {e}"))),
            other => Err(MarketDataError::unavailable(format!(
                "unexpected candle status {other:?}"
            ))),
        }
    }
}

/// `GET /stock/profile2`; every field is absent for unknown symbols.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    /// Ticker.
    pub ticker: Option<String>,
    /// Company name.
    pub name: Option<String>,
    /// Exchange.
    pub exchange: Option<String>,
    /// Currency.
    pub currency: Option<String>,
    /// Country.
    pub country: Option<String>,
    /// Industry.
    pub finnhub_industry: Option<String>,
    /// IPO date.
    pub ipo: Option<String>,
    /// Market cap (millions).
    pub market_capitalization: Option<f64>,
    /// Shares outstanding (millions).
    pub share_outstanding: Option<f64>,
    /// Logo URL.
    pub logo: Option<String>,
    /// Website.
    pub weburl: Option<String>,
}

impl ProfileResponse {
    /// Convert; an empty object means the symbol is unknown.
    ///
    /// # Errors
    ///
    /// [`MarketDataError::NotFound`] when neither ticker nor name is present.
    pub fn into_profile(self, symbol: &str) -> Result<CompanyProfile, MarketDataError> {
        let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        let ticker = non_empty(self.ticker);
        let Some(name) = non_empty(self.name).or_else(|| ticker.clone()) else {
            return Err(MarketDataError::NotFound);
        };

        Ok(CompanyProfile {
            symbol: ticker.unwrap_or_else(|| symbol.to_string()),
            name,
            exchange: non_empty(self.exchange),
            currency: non_empty(self.currency),
            country: non_empty(self.country),
            industry: non_empty(self.finnhub_industry),
            ipo: non_empty(self.ipo),
            market_capitalization: self.market_capitalization,
            shares_outstanding: self.share_outstanding,
            logo: non_empty(self.logo),
            web_url: non_empty(self.weburl),
        })
    }
}

/// `GET /stock/metric?metric=all`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricResponse {
    /// Metric name to value; non-numeric values are skipped.
    #[serde(default)]
    pub metric: HashMap<String, serde_json::Value>,
}

impl MetricResponse {
    /// Convert; no numeric metrics at all means the symbol is unknown.
    ///
    /// # Errors
    ///
    /// [`MarketDataError::NotFound`] when the metric map has no numbers.
    pub fn into_metrics(self, symbol: &str) -> Result<CompanyMetrics, MarketDataError> {
        let metrics: BTreeMap<String, f64> = self
            .metric
            .into_iter()
            .filter_map(|(k, v)| v.as_f64().map(|n| (k, n)))
            .collect();
        if metrics.is_empty() {
            return Err(MarketDataError::NotFound);
        }

        Ok(CompanyMetrics {
            symbol: symbol.to_string(),
            metrics,
        })
    }
}

/// `GET /search`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    /// Number of results.
    #[serde(default)]
    pub count: usize,
    /// Hits.
    #[serde(default)]
    pub result: Vec<SearchHit>,
}

/// One `/search` hit.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Display symbol.
    #[serde(default)]
    pub display_symbol: String,
    /// Symbol.
    pub symbol: String,
    /// Security type.
    #[serde(rename = "type", default)]
    pub security_type: String,
}

impl From<SearchHit> for SymbolMatch {
    fn from(hit: SearchHit) -> Self {
        Self {
            display_symbol: if hit.display_symbol.is_empty() {
                hit.symbol.clone()
            } else {
                hit.display_symbol
            },
            symbol: hit.symbol,
            description: hit.description,
            security_type: hit.security_type,
        }
    }
}

/// Error body some endpoints return alongside 4xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Message.
    pub error: String,
}
