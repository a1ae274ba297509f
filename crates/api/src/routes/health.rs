use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

pub fn health_router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}

/// Health check endpoint, no auth required.
async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.snapshot.read().await;
    Json(json!({
        "status": "ok",
        "mode": state.trading_mode.to_string(),
        "assets": snapshot.len(),
        "active": snapshot.iter().filter(|v| v.asset.active).count(),
    }))
}
