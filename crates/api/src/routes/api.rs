use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::warn;

use common::{Error, Instrument, RuntimeConfig, StrategyKind, Timeframe};

use crate::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/markets", get(get_markets))
        .route("/api/candles/:market/:timeframe", get(get_candles))
        .route("/api/strategies", get(get_strategies))
        .route("/api/config", get(get_config))
}

async fn get_markets(State(state): State<AppState>) -> Json<Vec<Instrument>> {
    Json(state.hub.markets().await.to_vec())
}

/// Raw candle series for charting; no signal evaluation.
async fn get_candles(
    State(state): State<AppState>,
    Path((market, timeframe)): Path<(String, String)>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let timeframe: Timeframe = timeframe
        .parse()
        .map_err(|e: Error| (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))))?;
    match state.source.fetch_candles(&market, &timeframe).await {
        Ok(series) => Ok(Json(json!({
            "market": market,
            "timeframe": timeframe,
            "candles": series,
        }))),
        Err(e) => {
            warn!(%market, %timeframe, error = %e, "Candle lookup failed");
            Err((StatusCode::BAD_GATEWAY, Json(json!({ "error": e.to_string() }))))
        }
    }
}

async fn get_strategies() -> Json<Vec<&'static str>> {
    Json(StrategyKind::ALL.iter().map(StrategyKind::as_str).collect())
}

async fn get_config(State(state): State<AppState>) -> Json<RuntimeConfig> {
    Json(state.hub.runtime().get())
}
