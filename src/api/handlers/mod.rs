//! Admin endpoint handlers organized by resource.

pub mod connections;
pub mod messages;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(connections::routes())
        .merge(messages::routes())
}
