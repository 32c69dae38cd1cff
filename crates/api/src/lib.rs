pub mod hub;
pub mod messages;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use common::{MarketDataSource, Result};

pub use hub::{Hub, Subscription};

/// Shared application state injected into every route handler.
#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    /// Used by the REST candle lookup; the poller holds its own handle.
    pub source: Arc<dyn MarketDataSource>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    Router::new()
        .merge(routes::api_router())
        .merge(routes::ws_router())
        .merge(routes::health_router())
        .with_state(state)
        .layer(cors)
}

/// Bind and serve until `shutdown` flips to `true`.
pub async fn serve(state: AppState, port: u16, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(%addr, "Signal server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            // a dropped sender also counts as shutdown
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    info!("Signal server stopped");
    Ok(())
}
