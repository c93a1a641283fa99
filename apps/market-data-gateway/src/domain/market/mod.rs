//! Market Data Types
//!
//! Canonical internal representation of the data the gateway serves:
//! quotes, candle series, company reference data, and symbol search hits.
//! These types are provider-agnostic; the upstream adapter converts wire
//! payloads into them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Symbols
// =============================================================================

/// A normalized (trimmed, upper-cased) ticker symbol.
pub type Symbol = String;

/// Longest symbol accepted from clients.
pub const MAX_SYMBOL_LEN: usize = 20;

/// Reasons a client-supplied symbol is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// Symbol was empty after trimming.
    #[error("symbol is empty")]
    Empty,
    /// Symbol exceeds [`MAX_SYMBOL_LEN`].
    #[error("symbol {0:?} exceeds {MAX_SYMBOL_LEN} characters")]
    TooLong(String),
    /// Symbol contains characters outside `[A-Z0-9.^:=-]`.
    #[error("symbol {0:?} contains invalid characters")]
    InvalidCharacters(String),
}

/// Normalize a client-supplied symbol.
///
/// # Errors
///
/// Returns [`SymbolError`] when the symbol is empty, too long, or contains
/// characters no exchange ticker uses.
pub fn normalize_symbol(raw: &str) -> Result<Symbol, SymbolError> {
    let symbol = raw.trim().to_uppercase();

    if symbol.is_empty() {
        return Err(SymbolError::Empty);
    }
    if symbol.len() > MAX_SYMBOL_LEN {
        return Err(SymbolError::TooLong(symbol));
    }
    let valid = symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | ':' | '='));
    if !valid {
        return Err(SymbolError::InvalidCharacters(symbol));
    }

    Ok(symbol)
}

// =============================================================================
// Quote
// =============================================================================

/// Latest quote for a single symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Symbol (e.g., "AAPL").
    pub symbol: Symbol,
    /// Current price.
    pub current: Decimal,
    /// Session open.
    pub open: Decimal,
    /// Session high.
    pub high: Decimal,
    /// Session low.
    pub low: Decimal,
    /// Previous session close.
    pub previous_close: Decimal,
    /// Absolute change from previous close.
    pub change: Decimal,
    /// Percent change from previous close.
    pub change_percent: Decimal,
    /// Session volume, when the provider reports it.
    pub volume: Option<u64>,
    /// Provider timestamp of the last price.
    pub timestamp: Option<DateTime<Utc>>,
    /// When the gateway fetched this quote.
    pub fetched_at: DateTime<Utc>,
}

// =============================================================================
// Candles
// =============================================================================

/// Candle resolution understood by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    /// 1-minute candles.
    #[serde(rename = "1")]
    Minute1,
    /// 5-minute candles.
    #[serde(rename = "5")]
    Minute5,
    /// 15-minute candles.
    #[serde(rename = "15")]
    Minute15,
    /// 30-minute candles.
    #[serde(rename = "30")]
    Minute30,
    /// 60-minute candles.
    #[serde(rename = "60")]
    Minute60,
    /// Daily candles.
    #[serde(rename = "D")]
    Day,
    /// Weekly candles.
    #[serde(rename = "W")]
    Week,
    /// Monthly candles.
    #[serde(rename = "M")]
    Month,
}

impl Resolution {
    /// Wire representation used in provider query strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minute1 => "1",
            Self::Minute5 => "5",
            Self::Minute15 => "15",
            Self::Minute30 => "30",
            Self::Minute60 => "60",
            Self::Day => "D",
            Self::Week => "W",
            Self::Month => "M",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the provider had candles for the requested window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesStatus {
    /// Candles present.
    Ok,
    /// Provider had no candles for the window.
    NoData,
}

/// Column-oriented OHLCV series, ascending by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleSeries {
    /// Symbol.
    pub symbol: Symbol,
    /// Sampling resolution.
    pub resolution: Resolution,
    /// Provider status.
    pub status: SeriesStatus,
    /// Candle open times (UNIX seconds).
    pub timestamps: Vec<i64>,
    /// Open prices.
    pub open: Vec<f64>,
    /// High prices.
    pub high: Vec<f64>,
    /// Low prices.
    pub low: Vec<f64>,
    /// Close prices.
    pub close: Vec<f64>,
    /// Volumes.
    pub volume: Vec<f64>,
}

/// Column data rejected by [`CandleSeries::from_columns`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSeries {
    /// Columns have different lengths.
    #[error("candle columns have mismatched lengths")]
    LengthMismatch,
    /// Timestamps are not strictly ascending.
    #[error("candle timestamps are not ascending at index {0}")]
    NotAscending(usize),
}

/// Raw OHLCV columns as returned by a provider.
#[derive(Debug, Clone, Default)]
pub struct CandleColumns {
    /// Candle open times (UNIX seconds).
    pub timestamps: Vec<i64>,
    /// Open prices.
    pub open: Vec<f64>,
    /// High prices.
    pub high: Vec<f64>,
    /// Low prices.
    pub low: Vec<f64>,
    /// Close prices.
    pub close: Vec<f64>,
    /// Volumes.
    pub volume: Vec<f64>,
}

impl CandleSeries {
    /// Build a series, checking that all columns line up and time ascends.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSeries`] when the columns cannot form a valid series.
    pub fn from_columns(
        symbol: Symbol,
        resolution: Resolution,
        columns: CandleColumns,
    ) -> Result<Self, InvalidSeries> {
        let n = columns.timestamps.len();
        if [
            columns.open.len(),
            columns.high.len(),
            columns.low.len(),
            columns.close.len(),
            columns.volume.len(),
        ]
        .iter()
        .any(|&len| len != n)
        {
            return Err(InvalidSeries::LengthMismatch);
        }

        if let Some(i) = columns.timestamps.windows(2).position(|w| w[1] <= w[0]) {
            return Err(InvalidSeries::NotAscending(i + 1));
        }

        Ok(Self {
            symbol,
            resolution,
            status: SeriesStatus::Ok,
            timestamps: columns.timestamps,
            open: columns.open,
            high: columns.high,
            low: columns.low,
            close: columns.close,
            volume: columns.volume,
        })
    }

    /// An empty series for a window the provider had nothing for.
    #[must_use]
    pub const fn no_data(symbol: Symbol, resolution: Resolution) -> Self {
        Self {
            symbol,
            resolution,
            status: SeriesStatus::NoData,
            timestamps: Vec::new(),
            open: Vec::new(),
            high: Vec::new(),
            low: Vec::new(),
            close: Vec::new(),
            volume: Vec::new(),
        }
    }

    /// Number of candles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the series has no candles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

// =============================================================================
// History Periods
// =============================================================================

/// Look-back window offered by the historical endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HistoryPeriod {
    /// One week of hourly candles.
    #[serde(rename = "1W")]
    OneWeek,
    /// One month of daily candles.
    #[serde(rename = "1M")]
    #[default]
    OneMonth,
    /// Three months of daily candles.
    #[serde(rename = "3M")]
    ThreeMonths,
    /// Six months of daily candles.
    #[serde(rename = "6M")]
    SixMonths,
    /// One year of daily candles.
    #[serde(rename = "1Y")]
    OneYear,
}

/// Unknown period string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown period {0:?}; expected one of 1W, 1M, 3M, 6M, 1Y")]
pub struct UnknownPeriod(pub String);

impl HistoryPeriod {
    /// Canonical label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneWeek => "1W",
            Self::OneMonth => "1M",
            Self::ThreeMonths => "3M",
            Self::SixMonths => "6M",
            Self::OneYear => "1Y",
        }
    }

    /// Calendar days covered by the period.
    #[must_use]
    pub const fn days(self) -> i64 {
        match self {
            Self::OneWeek => 7,
            Self::OneMonth => 30,
            Self::ThreeMonths => 90,
            Self::SixMonths => 180,
            Self::OneYear => 365,
        }
    }

    /// Candle resolution requested for the period.
    #[must_use]
    pub const fn resolution(self) -> Resolution {
        match self {
            Self::OneWeek => Resolution::Minute60,
            _ => Resolution::Day,
        }
    }

    /// `(from, to)` window ending at `now`.
    #[must_use]
    pub fn window(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - Duration::days(self.days()), now)
    }
}

impl FromStr for HistoryPeriod {
    type Err = UnknownPeriod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "1W" => Ok(Self::OneWeek),
            "1M" => Ok(Self::OneMonth),
            "3M" => Ok(Self::ThreeMonths),
            "6M" => Ok(Self::SixMonths),
            "1Y" => Ok(Self::OneYear),
            _ => Err(UnknownPeriod(s.to_string())),
        }
    }
}

impl fmt::Display for HistoryPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Reference Data
// =============================================================================

/// Company profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    /// Ticker.
    pub symbol: Symbol,
    /// Company name.
    pub name: String,
    /// Listing exchange.
    pub exchange: Option<String>,
    /// Reporting currency.
    pub currency: Option<String>,
    /// Country of domicile.
    pub country: Option<String>,
    /// Industry classification.
    pub industry: Option<String>,
    /// IPO date (YYYY-MM-DD).
    pub ipo: Option<String>,
    /// Market capitalization in millions.
    pub market_capitalization: Option<f64>,
    /// Shares outstanding in millions.
    pub shares_outstanding: Option<f64>,
    /// Logo URL.
    pub logo: Option<String>,
    /// Company website.
    pub web_url: Option<String>,
}

/// Numeric fundamentals keyed by metric name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyMetrics {
    /// Ticker.
    pub symbol: Symbol,
    /// Metric name → value (e.g. `52WeekHigh`, `beta`).
    pub metrics: std::collections::BTreeMap<String, f64>,
}

/// Symbol search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolMatch {
    /// Provider symbol.
    pub symbol: Symbol,
    /// Symbol as displayed to users.
    pub display_symbol: String,
    /// Security description (usually the company name).
    pub description: String,
    /// Security type (e.g. "Common Stock").
    pub security_type: String,
}

/// Performance of one symbol over a comparison period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    /// Ticker.
    pub symbol: Symbol,
    /// First close in the window.
    pub start_close: f64,
    /// Last close in the window.
    pub end_close: f64,
    /// Percent change from first to last close.
    pub change_percent: f64,
}

impl Comparison {
    /// Summarize a candle series; `None` when it has no closes.
    #[must_use]
    pub fn from_series(series: &CandleSeries) -> Option<Self> {
        let start_close = *series.close.first()?;
        let end_close = *series.close.last()?;
        let change_percent = if start_close == 0.0 {
            0.0
        } else {
            (end_close - start_close) / start_close * 100.0
        };

        Some(Self {
            symbol: series.symbol.clone(),
            start_close,
            end_close,
            change_percent,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    #[test_case(" aapl ", "AAPL" ; "trims and uppercases")]
    #[test_case("brk.b", "BRK.B" ; "share class suffix")]
    #[test_case("^gspc", "^GSPC" ; "index caret")]
    #[test_case("BINANCE:BTCUSDT", "BINANCE:BTCUSDT" ; "exchange prefix")]
    fn normalize_accepts(raw: &str, expected: &str) {
        assert_eq!(normalize_symbol(raw).unwrap(), expected);
    }

    #[test]
    fn normalize_rejects_bad_input() {
        assert_eq!(normalize_symbol("   "), Err(SymbolError::Empty));
        assert!(matches!(
            normalize_symbol("AAPL;DROP"),
            Err(SymbolError::InvalidCharacters(_))
        ));
        assert!(matches!(
            normalize_symbol(&"A".repeat(MAX_SYMBOL_LEN + 1)),
            Err(SymbolError::TooLong(_))
        ));
    }

    #[test_case("1w", HistoryPeriod::OneWeek)]
    #[test_case("1M", HistoryPeriod::OneMonth)]
    #[test_case("3m", HistoryPeriod::ThreeMonths)]
    #[test_case("6M", HistoryPeriod::SixMonths)]
    #[test_case("1y", HistoryPeriod::OneYear)]
    fn period_parsing(raw: &str, expected: HistoryPeriod) {
        assert_eq!(raw.parse::<HistoryPeriod>().unwrap(), expected);
    }

    #[test]
    fn period_rejects_unknown() {
        assert!("5Y".parse::<HistoryPeriod>().is_err());
    }

    #[test]
    fn period_window_ends_now() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 16, 0, 0).unwrap();
        let (from, to) = HistoryPeriod::OneMonth.window(now);
        assert_eq!(to, now);
        assert_eq!(now - from, Duration::days(30));
        assert_eq!(HistoryPeriod::OneWeek.resolution(), Resolution::Minute60);
        assert_eq!(HistoryPeriod::OneYear.resolution(), Resolution::Day);
    }

    #[test]
    fn series_rejects_mismatched_columns() {
        let columns = CandleColumns {
            timestamps: vec![1, 2],
            open: vec![1.0],
            high: vec![1.0, 2.0],
            low: vec![1.0, 2.0],
            close: vec![1.0, 2.0],
            volume: vec![1.0, 2.0],
        };
        assert_eq!(
            CandleSeries::from_columns("AAPL".into(), Resolution::Day, columns),
            Err(InvalidSeries::LengthMismatch)
        );
    }

    #[test]
    fn series_rejects_descending_time() {
        let columns = CandleColumns {
            timestamps: vec![3, 2],
            open: vec![1.0, 1.0],
            high: vec![1.0, 1.0],
            low: vec![1.0, 1.0],
            close: vec![1.0, 1.0],
            volume: vec![1.0, 1.0],
        };
        assert_eq!(
            CandleSeries::from_columns("AAPL".into(), Resolution::Day, columns),
            Err(InvalidSeries::NotAscending(1))
        );
    }

    #[test]
    fn comparison_from_series() {
        let columns = CandleColumns {
            timestamps: vec![1, 2, 3],
            open: vec![0.0; 3],
            high: vec![0.0; 3],
            low: vec![0.0; 3],
            close: vec![100.0, 90.0, 110.0],
            volume: vec![0.0; 3],
        };
        let series = CandleSeries::from_columns("MSFT".into(), Resolution::Day, columns).unwrap();
        let cmp = Comparison::from_series(&series).unwrap();
        assert!((cmp.change_percent - 10.0).abs() < 1e-9);

        let empty = CandleSeries::no_data("MSFT".into(), Resolution::Day);
        assert!(Comparison::from_series(&empty).is_none());
    }

    #[test]
    fn resolution_serializes_as_wire_code() {
        assert_eq!(serde_json::to_string(&Resolution::Day).unwrap(), "\"D\"");
        assert_eq!(serde_json::to_string(&Resolution::Minute60).unwrap(), "\"60\"");
    }
}
