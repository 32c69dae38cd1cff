use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

pub fn health_router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}

/// Liveness plus the config signals are currently computed under.
async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let config = state.hub.runtime().get();
    Json(json!({
        "status": "ok",
        "subscribers": state.hub.subscriber_count().await,
        "strategy": config.strategy,
        "timeframe": config.timeframe,
    }))
}
