use std::sync::{Arc, RwLock};

use tracing::info;

use crate::{Error, Result, RuntimeConfig, StrategyKind, Timeframe};

/// Cloneable handle to the active strategy and timeframe.
///
/// Readers take an owned snapshot with `get()`; the lock is never held
/// across an `.await`. A poisoned lock means a writer panicked mid-update,
/// which is treated as fatal.
#[derive(Clone, Default)]
pub struct RuntimeConfigStore {
    inner: Arc<RwLock<RuntimeConfig>>,
}

impl RuntimeConfigStore {
    pub fn new(initial: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Immutable snapshot of the current config.
    pub fn get(&self) -> RuntimeConfig {
        self.inner
            .read()
            .expect("runtime config lock poisoned")
            .clone()
    }

    /// Replace one or both fields. Both values are validated before the lock
    /// is taken; an unknown strategy or timeframe leaves the config untouched.
    pub fn set(
        &self,
        strategy: Option<&str>,
        timeframe: Option<Timeframe>,
    ) -> Result<RuntimeConfig> {
        let strategy = strategy.map(str::parse::<StrategyKind>).transpose()?;
        if let Some(timeframe) = timeframe.as_ref().filter(|tf| !tf.is_supported()) {
            return Err(Error::InvalidTimeframe(timeframe.to_string()));
        }

        let mut cfg = self.inner.write().expect("runtime config lock poisoned");
        if let Some(strategy) = strategy {
            cfg.strategy = strategy;
        }
        if let Some(timeframe) = timeframe {
            cfg.timeframe = timeframe;
        }
        info!(strategy = %cfg.strategy, timeframe = %cfg.timeframe, "Runtime config updated");
        Ok(cfg.clone())
    }
}
