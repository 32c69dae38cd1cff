use common::{CandleSeries, SignalFault, SignalResult, StrategyKind};
use tracing::debug;

use crate::indicators::{
    sma, Band, BollingerBands, MacdIndicator, MacdPoint, RsiIndicator, StochasticIndicator,
    StochasticPoint,
};

const RSI_PERIOD: usize = 14;
const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;

const MA_SHORT: usize = 50;
const MA_LONG: usize = 200;
const DUAL_MA_FAST: usize = 10;
const DUAL_MA_SLOW: usize = 30;

const BB_PERIOD: usize = 20;
const BB_STD_DEV: f64 = 2.0;

const STOCH_PERIOD: usize = 14;
const STOCH_SIGNAL: usize = 3;
const STOCH_OVERSOLD: f64 = 20.0;
const STOCH_OVERBOUGHT: f64 = 80.0;

/// Evaluate a strategy given by name. Unknown names yield an
/// `invalid_strategy` result instead of an error.
pub fn evaluate(series: &CandleSeries, strategy: &str) -> SignalResult {
    match strategy.parse::<StrategyKind>() {
        Ok(kind) => evaluate_with(series, kind),
        Err(_) => {
            debug!(strategy, "Unknown strategy requested");
            SignalResult::failed(SignalFault::InvalidStrategy)
        }
    }
}

/// Evaluate one of the built-in strategies over `series` (oldest first).
///
/// Only the two most recent aligned indicator points are inspected. A series
/// too short to produce two points gives a plain no-signal result.
pub fn evaluate_with(series: &CandleSeries, kind: StrategyKind) -> SignalResult {
    let closes = series.closes();

    match kind {
        StrategyKind::Macd => {
            let points = MacdIndicator::new(12, 26, 9).compute(&closes);
            last_two(&points).map_or_else(SignalResult::none, |(prev, curr)| macd_cross(prev, curr))
        }
        StrategyKind::Rsi => {
            let values = RsiIndicator::new(RSI_PERIOD).compute(&closes);
            last_two(&values).map_or_else(SignalResult::none, |(prev, curr)| rsi_reversal(prev, curr))
        }
        StrategyKind::MovingAverage => ma_cross(&closes, MA_SHORT, MA_LONG),
        StrategyKind::DualMovingAverage => ma_cross(&closes, DUAL_MA_FAST, DUAL_MA_SLOW),
        StrategyKind::BollingerBands => {
            let bands = BollingerBands::new(BB_PERIOD, BB_STD_DEV).compute(&closes);
            match (last_two(&bands), last_two(&closes)) {
                (Some((prev_band, curr_band)), Some((prev_close, curr_close))) => {
                    band_reentry(prev_close, prev_band, curr_close, curr_band)
                }
                _ => SignalResult::none(),
            }
        }
        StrategyKind::Stochastic => {
            let points = StochasticIndicator::new(STOCH_PERIOD, STOCH_SIGNAL).compute(
                &series.highs(),
                &series.lows(),
                &closes,
            );
            last_two(&points)
                .map_or_else(SignalResult::none, |(prev, curr)| stochastic_cross(prev, curr))
        }
    }
}

/// `(previous, latest)` from a series ordered oldest first.
fn last_two<T: Copy>(points: &[T]) -> Option<(T, T)> {
    match points {
        [.., prev, curr] => Some((*prev, *curr)),
        _ => None,
    }
}

// ─── Crossing rules ──────────────────────────────────────────────────────────

pub(crate) fn macd_cross(prev: MacdPoint, curr: MacdPoint) -> SignalResult {
    let buy = prev.macd <= prev.signal && curr.macd > curr.signal;
    let sell = prev.macd >= prev.signal && curr.macd < curr.signal;
    SignalResult::from_flags(buy, sell)
}

pub(crate) fn rsi_reversal(prev: f64, curr: f64) -> SignalResult {
    let buy = prev < RSI_OVERSOLD && curr > prev;
    let sell = prev > RSI_OVERBOUGHT && curr < prev;
    SignalResult::from_flags(buy, sell)
}

fn ma_cross(closes: &[f64], short: usize, long: usize) -> SignalResult {
    let short_ma = sma(closes, short);
    let long_ma = sma(closes, long);

    // Both series end on the latest bar, so their tails are aligned.
    match (last_two(&short_ma), last_two(&long_ma)) {
        (Some(short), Some(long)) => golden_cross(short, long),
        _ => SignalResult::none(),
    }
}

/// Both tuples are `(previous, latest)`.
pub(crate) fn golden_cross(short: (f64, f64), long: (f64, f64)) -> SignalResult {
    let buy = short.0 < long.0 && short.1 > long.1;
    let sell = short.0 > long.0 && short.1 < long.1;
    SignalResult::from_flags(buy, sell)
}

pub(crate) fn band_reentry(prev_close: f64, prev: Band, curr_close: f64, curr: Band) -> SignalResult {
    let buy = prev_close < prev.lower && curr_close > curr.lower;
    let sell = prev_close > prev.upper && curr_close < curr.upper;
    SignalResult::from_flags(buy, sell)
}

pub(crate) fn stochastic_cross(prev: StochasticPoint, curr: StochasticPoint) -> SignalResult {
    let buy = prev.k <= prev.d && curr.k > curr.d && curr.k < STOCH_OVERSOLD;
    let sell = prev.k >= prev.d && curr.k < curr.d && curr.k > STOCH_OVERBOUGHT;
    SignalResult::from_flags(buy, sell)
}
