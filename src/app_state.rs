//! Shared application state injected into all admin handlers.

use std::sync::Arc;

use crate::service::RelayServer;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The relay being observed.
    pub relay: Arc<RelayServer>,
}
