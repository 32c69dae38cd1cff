/// MACD (Moving Average Convergence/Divergence) indicator.
///
/// Computes: MACD line = EMA(fast) − EMA(slow), Signal = EMA(macd_line, signal_period).
/// Each EMA is seeded with the SMA of its first `period` inputs.
#[derive(Debug, Clone)]
pub struct MacdIndicator {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

/// One bar of MACD output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub macd: f64,
    pub signal: f64,
}

impl MacdIndicator {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(
            fast < slow,
            "MACD fast period must be less than slow period"
        );
        assert!(fast >= 1 && signal >= 1, "MACD periods must be >= 1");
        Self { fast, slow, signal }
    }

    /// Compute the aligned MACD/signal series from close prices (oldest first).
    /// The first point lands on bar `slow + signal - 2`, so two points need
    /// `slow + signal` closes.
    pub fn compute(&self, closes: &[f64]) -> Vec<MacdPoint> {
        if closes.len() < self.slow + self.signal - 1 {
            return Vec::new();
        }

        let fast_ema = ema_series(closes, self.fast);
        let slow_ema = ema_series(closes, self.slow);

        // fast EMA starts `slow - fast` bars earlier than slow EMA
        let offset = self.slow - self.fast;
        let macd_line: Vec<f64> = fast_ema[offset..]
            .iter()
            .zip(&slow_ema)
            .map(|(f, s)| f - s)
            .collect();

        let signal_line = ema_series(&macd_line, self.signal);

        macd_line[self.signal - 1..]
            .iter()
            .zip(&signal_line)
            .map(|(&macd, &signal)| MacdPoint { macd, signal })
            .collect()
    }
}

/// Exponential moving average series, one value per bar from bar `period - 1`.
fn ema_series(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return Vec::new();
    }
    let k = 2.0 / (period as f64 + 1.0);

    // Seed with SMA of first `period` values
    let mut ema_val: f64 = data[..period].iter().sum::<f64>() / period as f64;
    let mut out = Vec::with_capacity(data.len() - period + 1);
    out.push(ema_val);

    for &price in &data[period..] {
        ema_val = price * k + ema_val * (1.0 - k);
        out.push(ema_val);
    }
    out
}
