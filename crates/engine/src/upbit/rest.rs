use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use common::{
    Candle, CandleSeries, Error, Instrument, MarketDataSource, Result, Timeframe,
};

/// Public (unauthenticated) REST client for Upbit quotation endpoints.
pub struct UpbitClient {
    base_url: String,
    market_prefix: String,
    candle_count: u32,
    http: Client,
}

impl UpbitClient {
    pub fn new(
        base_url: impl Into<String>,
        market_prefix: impl Into<String>,
        candle_count: u32,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            market_prefix: market_prefix.into(),
            candle_count,
            http: Client::builder()
                .use_rustls_tls()
                .connect_timeout(Duration::from_secs(5))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    fn markets_url(&self) -> Result<Url> {
        Url::parse(&format!("{}/market/all", self.base_url)).map_err(|e| Error::Http(e.to_string()))
    }

    /// Day/week/month codes map to their own endpoints; the rest are minute
    /// units. Codes outside `Timeframe::SUPPORTED` never reach the provider.
    fn candles_url(&self, market: &str, timeframe: &Timeframe) -> Result<Url> {
        if !timeframe.is_supported() {
            return Err(Error::InvalidTimeframe(timeframe.to_string()));
        }
        let segments = match timeframe.as_str() {
            "day" => vec!["candles", "days"],
            "week" => vec!["candles", "weeks"],
            "month" => vec!["candles", "months"],
            minutes => vec!["candles", "minutes", minutes],
        };

        let mut url = Url::parse(&self.base_url).map_err(|e| Error::Http(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| Error::Http(format!("base url cannot have a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut()
            .append_pair("market", market)
            .append_pair("count", &self.candle_count.to_string());
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<String> {
        let resp = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::MarketData(format!("HTTP {status}: {body}")));
        }
        Ok(body)
    }
}

#[async_trait]
impl MarketDataSource for UpbitClient {
    async fn fetch_universe(&self) -> Result<Vec<Instrument>> {
        let body = self.get(self.markets_url()?).await?;
        let markets = parse_markets(&body, &self.market_prefix)?;
        debug!(count = markets.len(), prefix = %self.market_prefix, "Fetched market list");
        Ok(markets)
    }

    async fn fetch_candles(&self, market: &str, timeframe: &Timeframe) -> Result<CandleSeries> {
        let body = self.get(self.candles_url(market, timeframe)?).await?;
        parse_candles(&body)
    }
}

// ─── Upbit JSON parsing ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct MarketEntry {
    market: String,
    #[serde(default)]
    korean_name: String,
    #[serde(default)]
    english_name: String,
}

#[derive(Deserialize)]
struct CandleEntry {
    candle_date_time_utc: String,
    opening_price: f64,
    high_price: f64,
    low_price: f64,
    trade_price: f64,
    #[serde(default)]
    candle_acc_trade_volume: Option<f64>,
}

fn parse_markets(body: &str, prefix: &str) -> Result<Vec<Instrument>> {
    let entries: Vec<MarketEntry> = serde_json::from_str(body)?;
    Ok(entries
        .into_iter()
        .filter(|m| m.market.starts_with(prefix))
        .map(|m| Instrument {
            market: m.market,
            korean_name: m.korean_name,
            english_name: m.english_name,
        })
        .collect())
}

/// Upbit returns candles newest first; the series is re-ordered here.
fn parse_candles(body: &str) -> Result<CandleSeries> {
    let entries: Vec<CandleEntry> = serde_json::from_str(body)?;
    let candles = entries
        .into_iter()
        .map(|c| {
            let timestamp =
                NaiveDateTime::parse_from_str(&c.candle_date_time_utc, "%Y-%m-%dT%H:%M:%S")
                    .map_err(|e| {
                        Error::MarketData(format!(
                            "bad candle time '{}': {e}",
                            c.candle_date_time_utc
                        ))
                    })?
                    .and_utc();
            Ok(Candle {
                open: c.opening_price,
                high: c.high_price,
                low: c.low_price,
                close: c.trade_price,
                timestamp,
                volume: c.candle_acc_trade_volume,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(CandleSeries::from_unordered(candles))
}
