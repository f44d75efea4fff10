//! TCP listener: bind with address reuse, accept, and hand off.
//!
//! # Responsibilities
//! - Bind the relay port with `SO_REUSEADDR`
//! - Accept connections until the shutdown token fires
//! - Register each accepted stream and spawn its receive loop

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::receive_loop::{ReceiveContext, run_receive_loop};
use crate::domain::{ConnectionId, RelayEvent};
use crate::error::RelayError;

/// Pending-connection queue length passed to `listen(2)`.
const LISTEN_BACKLOG: i32 = 1024;

/// Pause after a failed `accept` (e.g. file descriptor exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Binds a non-blocking TCP listener with local address reuse enabled.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns [`RelayError::Bind`] if any socket setup step fails.
pub fn bind(addr: SocketAddr) -> Result<TcpListener, RelayError> {
    let bind_error = |source| RelayError::Bind { addr, source };

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(bind_error)?;
    socket.set_reuse_address(true).map_err(bind_error)?;
    socket.set_nonblocking(true).map_err(bind_error)?;
    socket.bind(&addr.into()).map_err(bind_error)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_error)?;

    let listener = TcpListener::from_std(std::net::TcpListener::from(socket)).map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;
    tracing::info!(address = %local_addr, "relay listener bound");
    Ok(listener)
}

/// Accepts connections until `shutdown` is cancelled.
///
/// Accept errors are logged and retried; they never end the loop.
pub async fn run_accept_loop(listener: TcpListener, ctx: ReceiveContext, shutdown: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
                }
                let (reader, writer) = stream.into_split();
                admit(reader, writer, peer, &ctx).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
    tracing::info!("relay listener stopped");
}

/// Registers a transport and spawns its receive loop.
///
/// Returns the identifier assigned by the registry.
pub async fn admit<R, W>(reader: R, writer: W, peer: SocketAddr, ctx: &ReceiveContext) -> ConnectionId
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let id = ctx.registry.register(peer, Box::new(writer)).await;
    tracing::info!(connection_id = %id, peer = %peer, "client connected");
    ctx.event_bus.publish(RelayEvent::ClientConnected {
        connection_id: id,
        peer_addr: peer,
        timestamp: Utc::now(),
    });

    // A concurrent stop() may already have cleared it.
    if let Some(connection) = ctx.registry.get(id).await {
        tokio::spawn(run_receive_loop(reader, Arc::clone(&connection), ctx.clone()));
    }
    id
}
