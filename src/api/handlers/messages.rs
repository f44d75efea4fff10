//! Message log handler.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{MessageListResponse, PaginationMeta, PaginationParams};
use crate::app_state::AppState;

/// `GET /messages` — Page through the retained message log, oldest first.
pub async fn list_messages(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let params = params.clamped();
    let (data, total) = state
        .relay
        .message_log()
        .page(params.page, params.per_page)
        .await;
    let total = u32::try_from(total).unwrap_or(u32::MAX);

    Json(MessageListResponse {
        data,
        pagination: PaginationMeta::new(&params, total),
    })
}

/// Message routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/messages", get(list_messages))
}
