use super::sma::sma;

/// Stochastic oscillator: %K over `period` bars, %D = SMA(%K, `signal`).
#[derive(Debug, Clone)]
pub struct StochasticIndicator {
    pub period: usize,
    pub signal: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochasticPoint {
    pub k: f64,
    pub d: f64,
}

impl StochasticIndicator {
    pub fn new(period: usize, signal: usize) -> Self {
        assert!(period >= 1 && signal >= 1, "Stochastic periods must be >= 1");
        Self { period, signal }
    }

    /// Only bars where both %K and %D exist are returned, so the first point
    /// belongs to bar `period + signal - 2`.
    ///
    /// A window with no range (highest high == lowest low) yields %K = 50.
    pub fn compute(&self, high: &[f64], low: &[f64], close: &[f64]) -> Vec<StochasticPoint> {
        let len = high.len().min(low.len()).min(close.len());
        if len < self.period {
            return Vec::new();
        }

        let k: Vec<f64> = (self.period - 1..len)
            .map(|i| {
                let start = i + 1 - self.period;
                let highest = high[start..=i].iter().copied().fold(f64::MIN, f64::max);
                let lowest = low[start..=i].iter().copied().fold(f64::MAX, f64::min);
                let range = highest - lowest;
                if range == 0.0 {
                    50.0
                } else {
                    (close[i] - lowest) / range * 100.0
                }
            })
            .collect();

        let d = sma(&k, self.signal);
        if d.is_empty() {
            return Vec::new();
        }

        k[self.signal - 1..]
            .iter()
            .zip(d)
            .map(|(&k, d)| StochasticPoint { k, d })
            .collect()
    }
}
