//! Response bodies for the connection and message endpoints.

use serde::Serialize;

use super::PaginationMeta;
use crate::domain::{ConnectionSummary, LoggedMessage};

/// Response for `GET /connections`.
#[derive(Debug, Serialize)]
pub struct ConnectionListResponse {
    /// Connections, oldest first.
    pub data: Vec<ConnectionSummary>,
    /// Number of connections.
    pub total: usize,
}

/// Paginated response for `GET /messages`.
#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    /// Messages, oldest first.
    pub data: Vec<LoggedMessage>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}
