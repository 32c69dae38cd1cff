use crate::{RuntimeConfig, StrategyKind, Timeframe};

/// All configuration loaded from environment variables at startup.
/// Every variable has a default; malformed values cause an immediate panic
/// with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,

    // Market data provider
    pub upbit_base_url: String,
    pub market_prefix: String,
    pub candle_count: u32,

    // Initial runtime config
    pub default_strategy: StrategyKind,
    pub default_timeframe: Timeframe,

    // Broadcast
    pub subscriber_queue: usize,

    // Poller settings file path
    pub poller_config_path: Option<String>,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let default_strategy = optional_env("DEFAULT_STRATEGY")
            .map(|name| {
                name.parse::<StrategyKind>().unwrap_or_else(|_| {
                    panic!(
                        "ERROR: DEFAULT_STRATEGY must be one of {:?}, got: '{name}'",
                        StrategyKind::ALL.map(|k| k.as_str())
                    )
                })
            })
            .unwrap_or_default();

        Config {
            port: parsed_env("PORT", 5000),
            upbit_base_url: optional_env("UPBIT_BASE_URL")
                .unwrap_or_else(|| "https://api.upbit.com/v1".to_string()),
            market_prefix: optional_env("MARKET_PREFIX").unwrap_or_else(|| "KRW-".to_string()),
            candle_count: parsed_env("CANDLE_COUNT", 200),
            default_strategy,
            default_timeframe: parsed_env("DEFAULT_TIMEFRAME", Timeframe::default()),
            subscriber_queue: parsed_env("SUBSCRIBER_QUEUE", 64),
            poller_config_path: optional_env("POLLER_CONFIG_PATH"),
        }
    }

    /// Runtime config the process starts with.
    pub fn initial_runtime(&self) -> RuntimeConfig {
        RuntimeConfig {
            strategy: self.default_strategy,
            timeframe: self.default_timeframe.clone(),
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("Environment variable '{key}' has an invalid value: '{raw}'")),
        None => default,
    }
}
