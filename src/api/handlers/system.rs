//! System endpoints: health check.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::app_state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    running: bool,
    relay_addr: Option<String>,
    active_connections: usize,
    timestamp: String,
    version: String,
}

/// `GET /health` — Relay health status.
///
/// Reports `"healthy"` while the relay listener is accepting and
/// `"stopped"` otherwise; the endpoint itself always answers 200.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let relay_addr = state.relay.local_addr().await;
    let running = relay_addr.is_some();
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: (if running { "healthy" } else { "stopped" }).to_string(),
            running,
            relay_addr: relay_addr.map(|addr| addr.to_string()),
            active_connections: state.relay.registry().len().await,
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
