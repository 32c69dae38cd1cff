use super::sma::sma;

/// Bollinger Bands: SMA middle band ± `std_dev` population standard deviations.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub period: usize,
    pub std_dev: f64,
}

/// Bands for one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub lower: f64,
    pub middle: f64,
    pub upper: f64,
}

impl BollingerBands {
    pub fn new(period: usize, std_dev: f64) -> Self {
        assert!(period >= 2, "Bollinger period must be >= 2");
        assert!(std_dev > 0.0, "Bollinger std_dev must be positive");
        Self { period, std_dev }
    }

    /// One band per full window. Point `i` belongs to close `i + period - 1`.
    pub fn compute(&self, closes: &[f64]) -> Vec<Band> {
        let middles = sma(closes, self.period);

        closes
            .windows(self.period)
            .zip(middles)
            .map(|(window, middle)| {
                let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>()
                    / self.period as f64;
                let width = self.std_dev * variance.sqrt();
                Band {
                    lower: middle - width,
                    middle,
                    upper: middle + width,
                }
            })
            .collect()
    }
}
