use axum::{extract::State, middleware, routing::get, Json, Router};
use serde_json::{json, Value};

use common::AssetView;

use crate::{auth::require_auth, AppState};

pub fn api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/assets", get(get_assets))
        .route("/api/signals", get(get_signals))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

fn row(view: &AssetView) -> Value {
    let a = &view.asset;
    json!({
        "id": a.id,
        "name": a.name,
        "pair": a.pair.to_string(),
        "state": a.state().to_string(),
        "active": a.active,
        "last_price": view.last_price,
        "matrix_price": a.matrix_price,
        "trigger": a.trigger(),
        "high_water": a.high_water,
        "low_water": a.low_water,
        "allocated_amount": a.allocated_amount,
        "proceeds_strategy": a.proceeds_strategy.to_string(),
        "deal_count": a.deal_count,
        "pl_pct": view.pl_pct(),
        "distance_to_trigger_pct": view.distance_to_trigger_pct(),
        "temperature": view.temperature().to_string(),
    })
}

// ─── Assets ───────────────────────────────────────────────────────────────────

async fn get_assets(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.snapshot.read().await;
    let assets: Vec<Value> = snapshot.iter().map(row).collect();
    Json(json!({
        "assets": assets,
        "holding": snapshot.iter().filter(|v| v.asset.holding).count(),
        "total": assets.len(),
    }))
}

// ─── Signals ──────────────────────────────────────────────────────────────────

async fn get_signals(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.snapshot.read().await;
    let signals: Vec<Value> = snapshot
        .iter()
        .filter(|v| v.asset.is_armed())
        .map(|v| {
            let mut r = row(v);
            r["side"] = json!(if v.asset.sell_armed { "sell" } else { "buy" });
            r["trail_stop"] = json!(v.asset.trail_stop);
            r
        })
        .collect();
    Json(json!({ "signals": signals, "total": signals.len() }))
}
