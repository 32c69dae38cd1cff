use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use api::{AppState, Hub};
use common::{Config, MarketDataSource, RuntimeConfigStore};
use engine::{BatchPoller, PollerSettings, UpbitClient};

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // ── Config ───────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    let settings = match &cfg.poller_config_path {
        Some(path) => PollerSettings::load(path)
            .unwrap_or_else(|e| panic!("Failed to load poller settings: {e}")),
        None => PollerSettings::default(),
    };
    info!(
        port = cfg.port,
        prefix = %cfg.market_prefix,
        strategy = %cfg.default_strategy,
        timeframe = %cfg.default_timeframe,
        "UpSignal starting"
    );

    // ── Shared state ─────────────────────────────────────────────────────────
    let runtime = RuntimeConfigStore::new(cfg.initial_runtime());
    let source: Arc<dyn MarketDataSource> = Arc::new(UpbitClient::new(
        cfg.upbit_base_url.clone(),
        cfg.market_prefix.clone(),
        cfg.candle_count,
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Poller → hub ─────────────────────────────────────────────────────────
    let (poller, batch_rx) = BatchPoller::new(source.clone(), runtime.clone(), settings);
    let hub = Hub::new(runtime, poller.universe(), source.clone(), cfg.subscriber_queue);

    // ── Spawn all tasks ──────────────────────────────────────────────────────
    let poller_task = tokio::spawn(poller.run(shutdown_rx.clone()));
    let hub_task = tokio::spawn(hub.clone().run(batch_rx));
    let mut server_task =
        tokio::spawn(api::serve(AppState { hub, source }, cfg.port, shutdown_rx));

    info!("All subsystems started. Waiting for shutdown signal.");
    let server_result = wait_for_shutdown(tokio::signal::ctrl_c(), &mut server_task).await;
    let _ = shutdown_tx.send(true);

    // poller exit closes the batch channel, which stops the hub
    for (name, task) in [("poller", poller_task), ("hub", hub_task)] {
        if let Err(e) = task.await {
            warn!(task = name, error = %e, "Task ended abnormally");
        }
    }
    let server_result = match server_result {
        Some(finished) => finished,
        None => server_task.await,
    };
    let failed = match server_result {
        Ok(Ok(())) => false,
        Ok(Err(e)) => {
            error!(error = %e, "Server exited with error");
            true
        }
        Err(e) => {
            warn!(task = "server", error = %e, "Task ended abnormally");
            true
        }
    };
    info!("UpSignal stopped");
    if failed {
        std::process::exit(1);
    }
}

/// Waits for Ctrl-C or for the server to exit on its own (e.g. the port is
/// taken). Returns the server's outcome only in the second case.
async fn wait_for_shutdown<S>(
    signal: S,
    server_task: &mut JoinHandle<common::Result<()>>,
) -> Option<Result<common::Result<()>, JoinError>>
where
    S: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        signal = signal => {
            if let Err(e) = signal {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received. Stopping.");
            None
        }
        finished = server_task => {
            error!("Server exited before shutdown was requested");
            Some(finished)
        }
    }
}
