//! relay-gateway entry point.
//!
//! Starts the relay listener and, unless disabled, the admin HTTP API.
//! Ctrl-C stops both.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use relay_gateway::api;
use relay_gateway::app_state::AppState;
use relay_gateway::config::RelayConfig;
use relay_gateway::service::RelayServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let config = RelayConfig::from_env().context("loading configuration")?;
    tracing::info!(addr = %config.listen_addr, "starting relay-gateway");

    // Start the relay
    let relay = Arc::new(RelayServer::new(config.clone()));
    let relay_addr = relay.start().await.context("starting relay listener")?;
    tracing::info!(addr = %relay_addr, "relay listening");

    if config.admin_enabled {
        let app = api::app(AppState {
            relay: Arc::clone(&relay),
        });
        let listener = tokio::net::TcpListener::bind(config.admin_listen_addr)
            .await
            .with_context(|| format!("binding admin API on {}", config.admin_listen_addr))?;
        tracing::info!(addr = %config.admin_listen_addr, "admin API listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("serving admin API")?;
    } else {
        shutdown_signal().await;
    }

    let closed = relay.stop().await;
    tracing::info!(closed, "relay-gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
}
