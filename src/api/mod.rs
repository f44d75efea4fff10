//! Admin HTTP API: status endpoints over the running relay.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` sits at the
//! root. The API observes the relay and can close connections; it never
//! injects messages.

pub mod dto;
pub mod handlers;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Builds the complete admin router with all endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}

/// Builds the admin router with state and request tracing applied.
pub fn app(state: AppState) -> Router {
    build_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
