use async_trait::async_trait;

use crate::{CandleSeries, Instrument, Result, Timeframe};

/// Abstraction over the market-data provider.
///
/// `UpbitClient` in `crates/engine` implements this against the public REST API.
/// Tests substitute in-memory fakes.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch the tradable instrument universe.
    async fn fetch_universe(&self) -> Result<Vec<Instrument>>;

    /// Fetch the most recent candles for one instrument, normalized oldest first.
    async fn fetch_candles(&self, market: &str, timeframe: &Timeframe) -> Result<CandleSeries>;
}
