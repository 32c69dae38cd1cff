use std::time::Duration;

use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// Poller timing, loaded from an optional TOML file.
///
/// Example `config/poller.toml`:
/// ```toml
/// cycle_period_ms = 5000
/// batch_size = 10
/// batch_delay_ms = 1000
/// fetch_timeout_ms = 10000
/// ```
/// Missing keys take the defaults shown above.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PollerSettings {
    /// Minimum wall-clock time between the starts of two cycles.
    pub cycle_period_ms: u64,
    /// Instruments fetched concurrently in one batch.
    pub batch_size: usize,
    /// Pause after each batch to stay under the provider rate limit.
    pub batch_delay_ms: u64,
    /// Upper bound on one instrument's candle fetch.
    pub fetch_timeout_ms: u64,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            cycle_period_ms: 5_000,
            batch_size: 10,
            batch_delay_ms: 1_000,
            fetch_timeout_ms: 10_000,
        }
    }
}

impl PollerSettings {
    /// Load from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| Error::Config(format!("{path}: {e}")))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        if settings.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }
        Ok(settings)
    }

    pub fn cycle_period(&self) -> Duration {
        Duration::from_millis(self.cycle_period_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
