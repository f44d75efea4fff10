//! Connection handlers: list, inspect, disconnect.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::ConnectionListResponse;
use crate::app_state::AppState;
use crate::domain::ConnectionId;
use crate::error::RelayError;

/// `GET /connections` — List open connections, oldest first.
pub async fn list_connections(State(state): State<AppState>) -> impl IntoResponse {
    let data = state.relay.registry().summaries().await;
    Json(ConnectionListResponse {
        total: data.len(),
        data,
    })
}

/// `GET /connections/{id}` — Get one connection.
///
/// # Errors
///
/// Returns [`RelayError::ConnectionNotFound`] if no such connection is
/// registered.
pub async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, RelayError> {
    let connection = state
        .relay
        .registry()
        .get(ConnectionId::from_uuid(id))
        .await
        .ok_or(RelayError::ConnectionNotFound(id))?;
    Ok(Json(connection.summary()))
}

/// `DELETE /connections/{id}` — Close a connection.
///
/// # Errors
///
/// Returns [`RelayError::ConnectionNotFound`] if no such connection is
/// registered.
pub async fn delete_connection(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, RelayError> {
    state.relay.disconnect(ConnectionId::from_uuid(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Connection routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/connections", get(list_connections))
        .route(
            "/connections/{id}",
            get(get_connection).delete(delete_connection),
        )
}
