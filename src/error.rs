//! Relay error types with HTTP status code mapping.
//!
//! [`RelayError`] is the central error type. Per-connection variants
//! (`Handshake`, `Transport`, `Decode`) are contained by the receive loop
//! of the connection they belong to; only `Bind`, `AlreadyRunning` and
//! `Config` ever reach the host. Each variant also maps to a structured
//! JSON body for the admin API.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::protocol::HandshakeError;

/// Structured JSON error response body.
///
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "connection not found: 6f1c…"
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

/// Relay error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category           | HTTP Status               |
/// |-----------|--------------------|---------------------------|
/// | 1000–1999 | Protocol           | 400 Bad Request           |
/// | 2000–2999 | State/Not Found    | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server / transport | 500 / 502                 |
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The listening socket could not be set up.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address the server tried to bind.
        addr: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// `start()` was called on a server that is already accepting.
    #[error("relay already running on {0}")]
    AlreadyRunning(SocketAddr),

    /// The upgrade request of a connection was rejected.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Read or write failure on a single connection.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Payload was not valid UTF-8.
    #[error("payload is not valid utf-8 (valid up to byte {valid_up_to})")]
    Decode {
        /// Length of the longest valid UTF-8 prefix.
        valid_up_to: usize,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No registered connection carries the given identifier.
    #[error("connection not found: {0}")]
    ConnectionNotFound(uuid::Uuid),
}

impl RelayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Handshake(_) => 1001,
            Self::Decode { .. } => 1002,
            Self::Config(_) => 1003,
            Self::ConnectionNotFound(_) => 2001,
            Self::AlreadyRunning(_) => 2002,
            Self::Bind { .. } => 3001,
            Self::Transport(_) => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Handshake(_) | Self::Decode { .. } | Self::Config(_) => StatusCode::BAD_REQUEST,
            Self::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyRunning(_) => StatusCode::CONFLICT,
            Self::Bind { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
