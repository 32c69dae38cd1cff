use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid strategy: '{0}'")]
    InvalidStrategy(String),

    #[error("Invalid timeframe: '{0}'")]
    InvalidTimeframe(String),

    #[error("Market data error: {0}")]
    MarketData(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed control message: {0}")]
    MalformedControl(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
