mod auth;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::sync::{watch, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use common::{AssetView, Result, TradingMode};

/// Shared application state injected into every route handler.
#[derive(Clone)]
pub struct AppState {
    /// Engine snapshot, written by the scheduler after every tick.
    pub snapshot: Arc<RwLock<Vec<AssetView>>>,
    pub trading_mode: TradingMode,
    pub dashboard_token: String,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    Router::new()
        .merge(routes::api_router(state.clone()))
        .merge(routes::health_router())
        .with_state(state)
        .layer(cors)
}

/// Build and run the read-only dashboard until `shutdown` flips to true.
pub async fn serve(state: AppState, port: u16, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(%addr, "Dashboard API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;
    info!("Dashboard API stopped");
    Ok(())
}
