use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// A tradable market as listed by the data provider.
/// Serialized with the provider's field names so dashboards can consume it as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Unique symbol, e.g. "KRW-BTC".
    pub market: String,
    #[serde(default)]
    pub korean_name: String,
    #[serde(default)]
    pub english_name: String,
}

impl Instrument {
    pub fn new(market: impl Into<String>) -> Self {
        Self {
            market: market.into(),
            korean_name: String::new(),
            english_name: String::new(),
        }
    }
}

/// One OHLC bar for a fixed time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Start of the candle's bucket.
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

/// Candles for one instrument and timeframe, always oldest first.
///
/// The only constructor sorts by timestamp, so provider ordering
/// (Upbit returns newest first) never leaks past ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CandleSeries(Vec<Candle>);

impl CandleSeries {
    pub fn from_unordered(mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.timestamp);
        Self(candles)
    }

    pub fn candles(&self) -> &[Candle] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.0.iter().map(|c| c.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.0.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.0.iter().map(|c| c.low).collect()
    }
}

/// The fixed set of built-in strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StrategyKind {
    #[default]
    Macd,
    Rsi,
    MovingAverage,
    BollingerBands,
    DualMovingAverage,
    Stochastic,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::Macd,
        StrategyKind::Rsi,
        StrategyKind::MovingAverage,
        StrategyKind::BollingerBands,
        StrategyKind::DualMovingAverage,
        StrategyKind::Stochastic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Macd => "macd",
            StrategyKind::Rsi => "rsi",
            StrategyKind::MovingAverage => "movingAverage",
            StrategyKind::BollingerBands => "bollingerBands",
            StrategyKind::DualMovingAverage => "dualMovingAverage",
            StrategyKind::Stochastic => "stochastic",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::InvalidStrategy(s.to_string()))
    }
}

/// Candle bucket code understood by the data provider ("1", "5", "240", "day", ...).
///
/// `new` does not check the code; anything that came from outside the process
/// goes through `FromStr` or `RuntimeConfigStore::set`, which reject codes
/// outside `SUPPORTED`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeframe(String);

impl Timeframe {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_supported(&self) -> bool {
        Self::SUPPORTED.contains(&self.0.as_str())
    }
}

impl Timeframe {
    /// Minute units, then calendar buckets.
    pub const SUPPORTED: [&'static str; 11] =
        ["1", "3", "5", "10", "15", "30", "60", "240", "day", "week", "month"];
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let timeframe = Timeframe::new(s);
        if timeframe.is_supported() {
            Ok(timeframe)
        } else {
            Err(Error::InvalidTimeframe(s.to_string()))
        }
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Self("5".to_string())
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a `SignalResult` carries no signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalFault {
    InvalidStrategy,
    FetchFailed,
}

impl std::fmt::Display for SignalFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalFault::InvalidStrategy => write!(f, "invalid_strategy"),
            SignalFault::FetchFailed => write!(f, "fetch_failed"),
        }
    }
}

/// Outcome of evaluating one strategy over one candle series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalResult {
    pub buy_signal: bool,
    pub sell_signal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SignalFault>,
}

impl SignalResult {
    /// No signal, no error. Also the answer for series too short to evaluate.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_flags(buy_signal: bool, sell_signal: bool) -> Self {
        Self {
            buy_signal,
            sell_signal,
            error: None,
        }
    }

    pub fn failed(fault: SignalFault) -> Self {
        Self {
            buy_signal: false,
            sell_signal: false,
            error: Some(fault),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Process-wide evaluation parameters, mutable at runtime by subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub strategy: StrategyKind,
    pub timeframe: Timeframe,
}

/// Signal for one instrument inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSignal {
    pub market: String,
    pub signals: SignalResult,
}

/// Results for one contiguous slice of the universe, tagged with the
/// config snapshot they were computed under.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultBatch {
    pub config: RuntimeConfig,
    pub results: Vec<InstrumentSignal>,
}
