//! Technical Indicators
//!
//! Pure functions computing indicators from an ordered close series.
//! Every function returns only the fully warmed-up values: output index `0`
//! aligns with input index `start` (see [`IndicatorSeries`]). A zero period
//! or an input shorter than the warm-up yields an empty result.

use serde::{Deserialize, Serialize};

use crate::domain::market::CandleSeries;

/// Default RSI look-back.
pub const RSI_PERIOD: usize = 14;
/// Default MACD fast EMA period.
pub const MACD_FAST: usize = 12;
/// Default MACD slow EMA period.
pub const MACD_SLOW: usize = 26;
/// Default MACD signal EMA period.
pub const MACD_SIGNAL: usize = 9;

// =============================================================================
// Moving Averages
// =============================================================================

/// Simple moving average over each window of `period` values.
///
/// Output length is `values.len() - period + 1`.
#[must_use]
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    #[allow(clippy::cast_precision_loss)]
    let n = period as f64;
    values
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / n)
        .collect()
}

/// Exponential moving average seeded with the SMA of the first `period`
/// values, then `ema[i] = v[i] * k + ema[i - 1] * (1 - k)` with
/// `k = 2 / (period + 1)`.
///
/// Output length is `values.len() - period + 1`.
#[must_use]
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    #[allow(clippy::cast_precision_loss)]
    let n = period as f64;
    let k = 2.0 / (n + 1.0);

    let seed = values[..period].iter().sum::<f64>() / n;
    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);

    let mut prev = seed;
    for &v in &values[period..] {
        prev = v.mul_add(k, prev * (1.0 - k));
        out.push(prev);
    }
    out
}

// =============================================================================
// Oscillators
// =============================================================================

/// Relative Strength Index using the mean gain and mean loss over each
/// window of `period` consecutive price changes.
///
/// Saturates at 100 when the window has no losses. Output length is
/// `values.len() - period`.
#[must_use]
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() <= period {
        return Vec::new();
    }
    #[allow(clippy::cast_precision_loss)]
    let n = period as f64;

    let deltas: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    deltas
        .windows(period)
        .map(|window| {
            let (gain, loss) = window.iter().fold((0.0, 0.0), |(g, l), &d| {
                if d > 0.0 { (g + d, l) } else { (g, l - d) }
            });
            let avg_gain = gain / n;
            let avg_loss = loss / n;
            if avg_loss == 0.0 {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
            }
        })
        .collect()
}

/// MACD line, signal line and histogram, index-aligned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    /// Fast EMA minus slow EMA.
    pub macd: Vec<f64>,
    /// EMA of the MACD line.
    pub signal: Vec<f64>,
    /// `macd - signal`.
    pub histogram: Vec<f64>,
}

impl Macd {
    /// Number of aligned points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.macd.len()
    }

    /// Whether there are no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.macd.is_empty()
    }
}

/// Candle index of the first MACD point.
#[must_use]
pub const fn macd_start(slow: usize, signal: usize) -> usize {
    slow + signal - 2
}

/// Moving Average Convergence Divergence.
///
/// All three output vectors have equal length and index `i` of each refers
/// to candle `macd_start(slow, signal) + i`. `fast` must be shorter than
/// `slow`; otherwise the result is empty.
#[must_use]
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    if fast == 0 || signal == 0 || fast >= slow || values.len() < macd_start(slow, signal) + 1 {
        return Macd::default();
    }

    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);
    let offset = slow - fast;

    let line: Vec<f64> = slow_ema
        .iter()
        .zip(&fast_ema[offset..])
        .map(|(s, f)| f - s)
        .collect();

    let signal_line = ema(&line, signal);
    let macd_line = line[signal - 1..].to_vec();
    let histogram = macd_line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| m - s)
        .collect();

    Macd {
        macd: macd_line,
        signal: signal_line,
        histogram,
    }
}

// =============================================================================
// Bundle
// =============================================================================

/// Indicator values plus the candle index the first value aligns with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSeries {
    /// Candle index of `values[0]`.
    pub start: usize,
    /// Indicator values.
    pub values: Vec<f64>,
}

/// MACD output with its alignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MacdSeries {
    /// Candle index of the first point.
    pub start: usize,
    /// Aligned MACD vectors.
    #[serde(flatten)]
    pub values: Macd,
}

/// Dashboard indicator set derived from one candle series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorBundle {
    /// SMA(20).
    pub sma20: IndicatorSeries,
    /// SMA(50).
    pub sma50: IndicatorSeries,
    /// EMA(12).
    pub ema12: IndicatorSeries,
    /// EMA(26).
    pub ema26: IndicatorSeries,
    /// RSI(14).
    pub rsi14: IndicatorSeries,
    /// MACD(12, 26, 9).
    pub macd: MacdSeries,
}

impl IndicatorBundle {
    /// Compute the bundle from the series closes.
    #[must_use]
    pub fn from_series(series: &CandleSeries) -> Self {
        let closes = &series.close;
        let moving = |values: Vec<f64>, period: usize| IndicatorSeries {
            start: period.saturating_sub(1),
            values,
        };

        Self {
            sma20: moving(sma(closes, 20), 20),
            sma50: moving(sma(closes, 50), 50),
            ema12: moving(ema(closes, 12), 12),
            ema26: moving(ema(closes, 26), 26),
            rsi14: IndicatorSeries {
                start: RSI_PERIOD,
                values: rsi(closes, RSI_PERIOD),
            },
            macd: MacdSeries {
                start: macd_start(MACD_SLOW, MACD_SIGNAL),
                values: macd(closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL),
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
