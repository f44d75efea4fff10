//! Relay server: lifecycle owner of the listener and the registry.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::domain::{ConnectionId, ConnectionRegistry, EventBus, MessageLog};
use crate::error::RelayError;
use crate::net::listener;
use crate::net::{BroadcastReport, Broadcaster, ReceiveContext};

#[derive(Debug)]
struct RunningListener {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    accept_task: JoinHandle<()>,
}

/// The relay: one instance per process, created by the host and passed
/// around explicitly.
///
/// Owns the [`ConnectionRegistry`], the [`Broadcaster`], the
/// [`MessageLog`] and the [`EventBus`]. [`RelayServer::start`] binds and
/// spawns the accept loop; [`RelayServer::stop`] cancels it and closes
/// every connection. A stopped server can be started again.
#[derive(Debug)]
pub struct RelayServer {
    config: RelayConfig,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Broadcaster,
    message_log: Arc<MessageLog>,
    event_bus: EventBus,
    running: Mutex<Option<RunningListener>>,
}

impl RelayServer {
    /// Creates a stopped server.
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let event_bus = EventBus::new(config.event_bus_capacity.max(1));
        let message_log = Arc::new(MessageLog::new(
            config.message_log_capacity,
            event_bus.clone(),
        ));
        Self {
            broadcaster: Broadcaster::new(Arc::clone(&registry), config.exclude_sender),
            registry,
            message_log,
            event_bus,
            config,
            running: Mutex::new(None),
        }
    }

    /// Returns the configuration the server was built with.
    #[must_use]
    pub const fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Returns the connection registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Returns the message log.
    #[must_use]
    pub const fn message_log(&self) -> &Arc<MessageLog> {
        &self.message_log
    }

    /// Returns the event bus.
    #[must_use]
    pub const fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Binds the configured address and starts accepting.
    ///
    /// Returns the bound address, which differs from the configured one
    /// when port 0 was requested.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::AlreadyRunning`] if the server is accepting,
    /// or [`RelayError::Bind`] if the port cannot be bound.
    pub async fn start(&self) -> Result<SocketAddr, RelayError> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            return Err(RelayError::AlreadyRunning(current.local_addr));
        }

        let tcp = listener::bind(self.config.listen_addr)?;
        let local_addr = tcp.local_addr().map_err(|source| RelayError::Bind {
            addr: self.config.listen_addr,
            source,
        })?;
        let shutdown = CancellationToken::new();
        let accept_task = tokio::spawn(listener::run_accept_loop(
            tcp,
            self.receive_context(),
            shutdown.clone(),
        ));

        tracing::info!(addr = %local_addr, "relay server started");
        *running = Some(RunningListener {
            local_addr,
            shutdown,
            accept_task,
        });
        Ok(local_addr)
    }

    /// Stops accepting and closes every registered connection.
    ///
    /// Returns the number of connections closed. When it returns the
    /// registry is empty. Calling it on a stopped server only clears the
    /// registry.
    ///
    /// The lifecycle lock is held until the registry is cleared, so a
    /// concurrent [`RelayServer::start`] only begins accepting afterwards.
    pub async fn stop(&self) -> usize {
        let mut running = self.running.lock().await;
        if let Some(listener) = running.take() {
            listener.shutdown.cancel();
            if let Err(e) = listener.accept_task.await {
                tracing::warn!(error = %e, "accept task ended abnormally");
            }
        }
        let closed = self.registry.clear().await;
        drop(running);
        tracing::info!(closed, "relay server stopped");
        closed
    }

    /// Returns `true` while the listener is accepting.
    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Returns the bound address while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|listener| listener.local_addr)
    }

    /// Broadcasts a server-originated message to every connection.
    pub async fn broadcast(&self, message: &[u8]) -> BroadcastReport {
        self.broadcaster.broadcast(message, None).await
    }

    /// Closes one connection.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConnectionNotFound`] if `id` is not
    /// registered.
    pub async fn disconnect(&self, id: ConnectionId) -> Result<(), RelayError> {
        if self.registry.remove(id).await {
            tracing::info!(connection_id = %id, "connection closed by operator");
            Ok(())
        } else {
            Err(RelayError::ConnectionNotFound(*id.as_uuid()))
        }
    }

    fn receive_context(&self) -> ReceiveContext {
        ReceiveContext {
            registry: Arc::clone(&self.registry),
            broadcaster: self.broadcaster.clone(),
            message_log: Arc::clone(&self.message_log),
            event_bus: self.event_bus.clone(),
            max_frame_bytes: self.config.max_frame_bytes,
            idle_timeout: self.config.idle_timeout,
            handshake_timeout: self.config.handshake_timeout,
        }
    }
}
