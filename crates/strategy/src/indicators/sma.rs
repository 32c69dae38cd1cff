/// Rolling mean of `period` values. Empty when `values` is shorter than `period`.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(values.len() - period + 1);
    let mut sum: f64 = values[..period].iter().sum();
    out.push(sum / period as f64);

    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out.push(sum / period as f64);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_empty_when_insufficient_data() {
        assert!(sma(&[1.0, 2.0, 3.0, 4.0], 5).is_empty());
    }

    #[test]
    fn sma_known_values() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(out.len(), 3);
        for (got, want) in out.iter().zip([2.0, 3.0, 4.0]) {
            assert!((got - want).abs() < 1e-9, "expected {want}, got {got}");
        }
    }

    #[test]
    fn zero_period_is_empty() {
        assert!(sma(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn sma_of_constant_series_is_constant() {
        let out = sma(&[7.5; 20], 10);
        assert_eq!(out.len(), 11);
        assert!(out.iter().all(|v| (v - 7.5).abs() < 1e-9));
    }
}
