pub mod config;
pub mod error;
pub mod runtime;
pub mod source;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use runtime::RuntimeConfigStore;
pub use source::MarketDataSource;
pub use types::*;
