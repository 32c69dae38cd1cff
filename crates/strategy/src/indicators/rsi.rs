/// RSI (Relative Strength Index) indicator.
///
/// Uses Wilder's smoothed moving average (same as TradingView / standard RSI).
/// Produces one value per bar once `period + 1` closes are available.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
}

impl RsiIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 2, "RSI period must be >= 2");
        Self { period }
    }

    /// Compute the RSI series from close prices (oldest first).
    /// Returns `closes.len() - period` values, or none if there are
    /// fewer than `period + 1` closes.
    pub fn compute(&self, closes: &[f64]) -> Vec<f64> {
        if closes.len() < self.period + 1 {
            return Vec::new();
        }

        // First average gain/loss over the initial `period` changes
        let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
        let initial = &changes[..self.period];

        let mut avg_gain = initial.iter().filter(|&&c| c > 0.0).sum::<f64>() / self.period as f64;
        let mut avg_loss = initial.iter().filter(|&&c| c < 0.0).map(|c| c.abs()).sum::<f64>()
            / self.period as f64;

        let mut out = Vec::with_capacity(changes.len() - self.period + 1);
        out.push(rsi_value(avg_gain, avg_loss));

        // Wilder smoothing over remaining changes
        for &change in &changes[self.period..] {
            let gain = if change > 0.0 { change } else { 0.0 };
            let loss = if change < 0.0 { change.abs() } else { 0.0 };
            avg_gain = (avg_gain * (self.period - 1) as f64 + gain) / self.period as f64;
            avg_loss = (avg_loss * (self.period - 1) as f64 + loss) / self.period as f64;
            out.push(rsi_value(avg_gain, avg_loss));
        }
        out
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
