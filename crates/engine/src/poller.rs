use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use common::{
    Instrument, InstrumentSignal, MarketDataSource, ResultBatch, RuntimeConfig,
    RuntimeConfigStore, SignalFault, SignalResult,
};
use strategy::evaluate_with;

use crate::settings::PollerSettings;

const BATCH_CHANNEL_CAPACITY: usize = 64;

/// Walks the instrument universe in rate-limited batches, evaluating the
/// active strategy for every instrument and handing each finished batch
/// to the broadcast side.
pub struct BatchPoller {
    source: Arc<dyn MarketDataSource>,
    runtime: RuntimeConfigStore,
    settings: PollerSettings,
    batch_tx: mpsc::Sender<ResultBatch>,
    universe_tx: watch::Sender<Arc<[Instrument]>>,
}

impl BatchPoller {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        runtime: RuntimeConfigStore,
        settings: PollerSettings,
    ) -> (Self, mpsc::Receiver<ResultBatch>) {
        let (batch_tx, batch_rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
        let (universe_tx, _) = watch::channel(Arc::<[Instrument]>::from(Vec::new()));

        let poller = BatchPoller {
            source,
            runtime,
            settings,
            batch_tx,
            universe_tx,
        };
        (poller, batch_rx)
    }

    /// Latest universe snapshot, replaced wholesale on every refresh.
    pub fn universe(&self) -> watch::Receiver<Arc<[Instrument]>> {
        self.universe_tx.subscribe()
    }

    /// Run the poll loop until `shutdown` flips to `true` or its sender is
    /// dropped. In-flight fetches are abandoned, not awaited.
    /// Call from `tokio::spawn`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            batch_size = self.settings.batch_size,
            cycle_ms = self.settings.cycle_period_ms,
            batch_delay_ms = self.settings.batch_delay_ms,
            "Batch poller started"
        );

        loop {
            let cycle_start = Instant::now();

            let flow = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => ControlFlow::Break(()),
                flow = self.run_cycle() => flow,
            };
            if flow.is_break() {
                break;
            }

            let remaining = self
                .settings
                .cycle_period()
                .saturating_sub(cycle_start.elapsed());
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                _ = tokio::time::sleep(remaining) => {}
            }
        }

        info!("Batch poller stopped");
    }

    /// One pass over the universe. Breaks only when nobody is left to
    /// receive batches.
    async fn run_cycle(&self) -> ControlFlow<()> {
        let universe: Arc<[Instrument]> = match self.source.fetch_universe().await {
            Ok(markets) => markets.into(),
            Err(e) => {
                error!(error = %e, "Universe refresh failed, keeping previous snapshot");
                return ControlFlow::Continue(());
            }
        };
        self.universe_tx.send_replace(universe.clone());
        debug!(instruments = universe.len(), "Universe refreshed");

        for chunk in universe.chunks(self.settings.batch_size.max(1)) {
            let batch = self.poll_batch(chunk).await;
            let failed = batch.results.iter().filter(|r| r.signals.is_error()).count();
            debug!(size = batch.results.len(), failed, strategy = %batch.config.strategy, "Batch complete");

            if self.batch_tx.send(batch).await.is_err() {
                warn!("Batch channel closed — stopping poller");
                return ControlFlow::Break(());
            }
            tokio::time::sleep(self.settings.batch_delay()).await;
        }
        ControlFlow::Continue(())
    }

    /// Fetch and evaluate every instrument in `instruments` concurrently.
    ///
    /// The runtime config is read once up front, so a change made while the
    /// batch is in flight only applies to the next batch. Results keep the
    /// input order and one failed instrument never aborts the others.
    pub async fn poll_batch(&self, instruments: &[Instrument]) -> ResultBatch {
        let config = self.runtime.get();
        let timeout = self.settings.fetch_timeout();

        let results = join_all(
            instruments
                .iter()
                .map(|inst| self.poll_instrument(&inst.market, &config, timeout)),
        )
        .await;

        ResultBatch { config, results }
    }

    async fn poll_instrument(
        &self,
        market: &str,
        config: &RuntimeConfig,
        timeout: Duration,
    ) -> InstrumentSignal {
        let fetch = self.source.fetch_candles(market, &config.timeframe);

        let signals = match tokio::time::timeout(timeout, fetch).await {
            Ok(Ok(series)) => evaluate_with(&series, config.strategy),
            Ok(Err(e)) => {
                warn!(market, timeframe = %config.timeframe, error = %e, "Candle fetch failed");
                SignalResult::failed(SignalFault::FetchFailed)
            }
            Err(_) => {
                warn!(market, timeout_ms = timeout.as_millis() as u64, "Candle fetch timed out");
                SignalResult::failed(SignalFault::FetchFailed)
            }
        };

        InstrumentSignal {
            market: market.to_string(),
            signals,
        }
    }
}

/// Resolves once shutdown is signalled or the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use tokio::sync::{Notify, Semaphore};

    use common::{Candle, CandleSeries, Error, Result, StrategyKind, Timeframe};

    #[derive(Default)]
    struct FakeSource {
        markets: Vec<String>,
        failing: Vec<String>,
        hanging: Vec<String>,
        fail_universe: bool,
        gate: Option<Arc<Semaphore>>,
        started: Notify,
        universe_calls: AtomicUsize,
        universe_at: Mutex<Vec<Instant>>,
        candle_calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeSource {
        fn with_markets(markets: &[&str]) -> Self {
            Self {
                markets: markets.iter().map(|m| m.to_string()).collect(),
                ..Default::default()
            }
        }

        fn timeframes_for(&self, market: &str) -> Vec<String> {
            self.candle_calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(m, _)| m == market)
                .map(|(_, tf)| tf.clone())
                .collect()
        }
    }

    fn rising_series(n: usize) -> CandleSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let candles = (0..n)
            .map(|i| {
                let close = 100.0 + i as f64;
                Candle {
                    open: close,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    timestamp: start + ChronoDuration::minutes(i as i64),
                    volume: None,
                }
            })
            .collect();
        CandleSeries::from_unordered(candles)
    }

    #[async_trait]
    impl MarketDataSource for FakeSource {
        async fn fetch_universe(&self) -> Result<Vec<Instrument>> {
            self.universe_calls.fetch_add(1, Ordering::SeqCst);
            self.universe_at.lock().unwrap().push(Instant::now());
            if self.fail_universe {
                return Err(Error::MarketData("universe unavailable".into()));
            }
            Ok(self.markets.iter().map(Instrument::new).collect())
        }

        async fn fetch_candles(&self, market: &str, timeframe: &Timeframe) -> Result<CandleSeries> {
            self.candle_calls
                .lock()
                .unwrap()
                .push((market.to_string(), timeframe.to_string()));
            self.started.notify_one();

            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            if self.hanging.iter().any(|m| m == market) {
                std::future::pending::<()>().await;
            }
            if self.failing.iter().any(|m| m == market) {
                return Err(Error::MarketData(format!("{market} unavailable")));
            }
            Ok(rising_series(60))
        }
    }

    fn fast_settings() -> PollerSettings {
        PollerSettings {
            cycle_period_ms: 20,
            batch_size: 2,
            batch_delay_ms: 5,
            fetch_timeout_ms: 1_000,
        }
    }

    fn instruments(ids: &[&str]) -> Vec<Instrument> {
        ids.iter().map(|id| Instrument::new(*id)).collect()
    }

    async fn next_batch(rx: &mut mpsc::Receiver<ResultBatch>) -> ResultBatch {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no batch within 2s")
            .expect("batch channel closed")
    }

    /// Resolves once `n` candle fetches have started. Gated fetches only all
    /// start if the batch runs them concurrently.
    async fn wait_for_fetches(source: &FakeSource, n: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while source.candle_calls.lock().unwrap().len() < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("batch fetches did not all start before any finished");
    }

    #[tokio::test]
    async fn failed_fetch_is_isolated_to_its_instrument() {
        let source = FakeSource {
            failing: vec!["KRW-B".into()],
            ..FakeSource::with_markets(&["KRW-A", "KRW-B", "KRW-C"])
        };
        let (poller, _rx) =
            BatchPoller::new(Arc::new(source), RuntimeConfigStore::default(), fast_settings());

        let batch = poller
            .poll_batch(&instruments(&["KRW-A", "KRW-B", "KRW-C"]))
            .await;

        assert_eq!(batch.results.len(), 3);
        let markets: Vec<&str> = batch.results.iter().map(|r| r.market.as_str()).collect();
        assert_eq!(markets, vec!["KRW-A", "KRW-B", "KRW-C"]);

        let expected = evaluate_with(&rising_series(60), StrategyKind::Macd);
        assert_eq!(batch.results[0].signals, expected);
        assert_eq!(batch.results[1].signals, SignalResult::failed(SignalFault::FetchFailed));
        assert_eq!(batch.results[2].signals, expected);
    }

    #[tokio::test]
    async fn hung_fetch_times_out_as_fetch_failed() {
        let source = FakeSource {
            hanging: vec!["KRW-SLOW".into()],
            ..FakeSource::with_markets(&["KRW-SLOW", "KRW-OK"])
        };
        let settings = PollerSettings {
            fetch_timeout_ms: 50,
            ..fast_settings()
        };
        let (poller, _rx) = BatchPoller::new(Arc::new(source), RuntimeConfigStore::default(), settings);

        let batch = poller.poll_batch(&instruments(&["KRW-SLOW", "KRW-OK"])).await;
        assert_eq!(batch.results[0].signals.error, Some(SignalFault::FetchFailed));
        assert!(batch.results[1].signals.error.is_none());
    }

    #[tokio::test]
    async fn config_change_mid_batch_applies_to_next_batch() {
        let gate = Arc::new(Semaphore::new(0));
        let source = Arc::new(FakeSource {
            gate: Some(gate.clone()),
            ..FakeSource::with_markets(&["KRW-A", "KRW-B"])
        });
        let store = RuntimeConfigStore::default();
        let (poller, _rx) = BatchPoller::new(source.clone(), store.clone(), fast_settings());
        let poller = Arc::new(poller);

        let in_flight = {
            let poller = poller.clone();
            tokio::spawn(async move { poller.poll_batch(&instruments(&["KRW-A", "KRW-B"])).await })
        };

        // Both fetches are parked on the gate before the config changes.
        wait_for_fetches(&source, 2).await;
        store.set(Some("rsi"), Some(Timeframe::new("day"))).unwrap();
        gate.add_permits(2);

        let first = in_flight.await.unwrap();
        assert_eq!(first.config.strategy, StrategyKind::Macd);
        assert_eq!(first.config.timeframe.as_str(), "5");
        assert_eq!(source.timeframes_for("KRW-B"), vec!["5".to_string()]);

        gate.add_permits(2);
        let second = poller.poll_batch(&instruments(&["KRW-A", "KRW-B"])).await;
        assert_eq!(second.config.strategy, StrategyKind::Rsi);
        assert_eq!(
            second.results[0].signals,
            evaluate_with(&rising_series(60), StrategyKind::Rsi)
        );
        assert_eq!(source.timeframes_for("KRW-A"), vec!["5".to_string(), "day".to_string()]);
    }

    #[tokio::test]
    async fn run_emits_batches_in_universe_order() {
        let source = FakeSource::with_markets(&["KRW-A", "KRW-B", "KRW-C"]);
        let (poller, mut rx) =
            BatchPoller::new(Arc::new(source), RuntimeConfigStore::default(), fast_settings());
        let universe = poller.universe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(poller.run(shutdown_rx));

        let first = next_batch(&mut rx).await;
        let second = next_batch(&mut rx).await;
        let markets: Vec<String> = first
            .results
            .iter()
            .chain(&second.results)
            .map(|r| r.market.clone())
            .collect();
        assert_eq!(markets, vec!["KRW-A", "KRW-B", "KRW-C"]);
        assert_eq!(first.results.len(), 2);
        assert_eq!(second.results.len(), 1);
        assert_eq!(universe.borrow().len(), 3);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("poller did not stop")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn run_spaces_batches_and_cycles() {
        let source = Arc::new(FakeSource::with_markets(&["KRW-A", "KRW-B", "KRW-C"]));
        let settings = PollerSettings {
            cycle_period_ms: 1_000,
            batch_size: 1,
            batch_delay_ms: 100,
            fetch_timeout_ms: 10_000,
        };
        let (poller, mut rx) =
            BatchPoller::new(source.clone(), RuntimeConfigStore::default(), settings.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(poller.run(shutdown_rx));

        // three batches of the first cycle, then the first of the second
        let mut arrivals = Vec::new();
        for _ in 0..4 {
            next_batch(&mut rx).await;
            arrivals.push(Instant::now());
        }

        for (i, pair) in arrivals.windows(2).enumerate() {
            let gap = pair[1] - pair[0];
            assert!(gap >= settings.batch_delay(), "batches {i} and {} only {gap:?} apart", i + 1);
        }
        assert!(arrivals[3] - arrivals[0] >= settings.cycle_period());

        let refreshes = source.universe_at.lock().unwrap().clone();
        assert_eq!(refreshes.len(), 2);
        assert!(refreshes[1] - refreshes[0] >= settings.cycle_period());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_abandons_in_flight_fetches() {
        let source = Arc::new(FakeSource {
            hanging: vec!["KRW-A".into()],
            ..FakeSource::with_markets(&["KRW-A"])
        });
        let settings = PollerSettings {
            fetch_timeout_ms: 60_000,
            ..fast_settings()
        };
        let (poller, _rx) = BatchPoller::new(source.clone(), RuntimeConfigStore::default(), settings);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(poller.run(shutdown_rx));

        source.started.notified().await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .expect("shutdown waited on a hung fetch")
            .unwrap();
    }

    #[tokio::test]
    async fn universe_failure_does_not_stop_the_loop() {
        let source = Arc::new(FakeSource {
            fail_universe: true,
            ..FakeSource::with_markets(&["KRW-A"])
        });
        let (poller, mut rx) =
            BatchPoller::new(source.clone(), RuntimeConfigStore::default(), fast_settings());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(poller.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(source.universe_calls.load(Ordering::SeqCst) >= 2);
        assert!(rx.try_recv().is_err());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_shutdown_sender_stops_the_loop() {
        let source = FakeSource::with_markets(&["KRW-A"]);
        let (poller, _rx) =
            BatchPoller::new(Arc::new(source), RuntimeConfigStore::default(), fast_settings());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(shutdown_tx);
        tokio::time::timeout(Duration::from_millis(500), poller.run(shutdown_rx))
            .await
            .expect("poller kept running without a shutdown sender");
    }
}
