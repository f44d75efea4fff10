//! A registered client connection and its handshake state.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ConnectionId;

/// Write half of a client transport.
///
/// Boxed so the registry can hold TCP streams and in-memory test
/// transports side by side.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Payloads queued per connection before further sends are refused.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Upgrade progress of a connection.
///
/// Leaves `Pending` exactly once. `Passthrough` is the implicit upgrade of
/// a client whose first payload was not an HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum HandshakeState {
    /// No payload processed yet.
    Pending = 0,
    /// Upgrade handshake completed.
    Upgraded = 1,
    /// First payload was a plain message; no handshake will follow.
    Passthrough = 2,
}

impl HandshakeState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Upgraded,
            2 => Self::Passthrough,
            _ => Self::Pending,
        }
    }
}

/// One client socket owned by the [`super::ConnectionRegistry`].
///
/// The receive loop owns the read half. The write half belongs to a
/// writer task that drains a bounded outbound queue, so a peer that stops
/// reading only ever stalls its own queue.
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    connected_at: DateTime<Utc>,
    last_activity_ms: AtomicI64,
    messages_received: AtomicU64,
    state: AtomicU8,
    closed: AtomicBool,
    cancel: CancellationToken,
    outbound: mpsc::Sender<Arc<[u8]>>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Creates an open connection in the `Pending` state and spawns its
    /// writer task.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(id: ConnectionId, peer_addr: SocketAddr, writer: BoxedWriter) -> Self {
        let now = Utc::now();
        let cancel = CancellationToken::new();
        let (outbound, queue) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let writer_task = tokio::spawn(run_writer(id, writer, queue, cancel.clone()));
        Self {
            id,
            peer_addr,
            connected_at: now,
            last_activity_ms: AtomicI64::new(now.timestamp_millis()),
            messages_received: AtomicU64::new(0),
            state: AtomicU8::new(HandshakeState::Pending as u8),
            closed: AtomicBool::new(false),
            cancel,
            outbound,
            writer_task: Mutex::new(Some(writer_task)),
        }
    }

    /// Returns the connection identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the remote address.
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Returns the accept timestamp.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Returns the time of the last inbound payload (or the accept time).
    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_activity_ms.load(Ordering::Relaxed))
            .unwrap_or(self.connected_at)
    }

    /// Records inbound activity.
    pub fn touch(&self) {
        self.last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Counts one relayed message from this client.
    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of messages relayed from this client.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Returns the current handshake state.
    #[must_use]
    pub fn handshake_state(&self) -> HandshakeState {
        HandshakeState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves `Pending → Upgraded`. Returns `false` if the state had
    /// already left `Pending`.
    pub fn mark_upgraded(&self) -> bool {
        self.leave_pending(HandshakeState::Upgraded)
    }

    /// Moves `Pending → Passthrough`. Returns `false` if the state had
    /// already left `Pending`.
    pub fn mark_passthrough(&self) -> bool {
        self.leave_pending(HandshakeState::Passthrough)
    }

    fn leave_pending(&self, to: HandshakeState) -> bool {
        self.state
            .compare_exchange(
                HandshakeState::Pending as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Returns `true` once [`Connection::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves when the connection is closed.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Queues the payload for the writer task without waiting.
    ///
    /// Payloads are written in queue order. Whatever is still queued when
    /// the connection closes is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`std::io::ErrorKind::NotConnected`] if the connection is
    /// closed or its writer has stopped, and
    /// [`std::io::ErrorKind::WouldBlock`] if the queue is full because the
    /// peer is not reading.
    pub fn send(&self, payload: Arc<[u8]>) -> std::io::Result<()> {
        if self.is_closed() {
            return Err(not_connected());
        }
        self.outbound.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "outbound queue full",
            ),
            mpsc::error::TrySendError::Closed(_) => not_connected(),
        })
    }

    /// Closes the transport. Idempotent.
    ///
    /// Cancels the receive loop, aborts a write blocked on the peer and
    /// waits for the writer task to shut down the write half.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        let writer_task = self.writer_task.lock().await.take();
        if let Some(task) = writer_task
            && let Err(e) = task.await
        {
            tracing::debug!(connection_id = %self.id, error = %e, "writer task ended abnormally");
        }
    }

    /// Returns a serializable point-in-time view of this connection.
    #[must_use]
    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            connection_id: self.id,
            peer_addr: self.peer_addr,
            handshake_state: self.handshake_state(),
            connected_at: self.connected_at,
            last_activity: self.last_activity(),
            messages_received: self.messages_received(),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("handshake_state", &self.handshake_state())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn not_connected() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotConnected, "connection closed")
}

/// Drains the outbound queue into the write half until the connection is
/// closed or a write fails, then shuts the write half down.
async fn run_writer(
    id: ConnectionId,
    mut writer: BoxedWriter,
    mut queue: mpsc::Receiver<Arc<[u8]>>,
    cancel: CancellationToken,
) {
    loop {
        let payload = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            payload = queue.recv() => payload,
        };
        let Some(payload) = payload else { break };
        let written = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            written = async {
                writer.write_all(&payload).await?;
                writer.flush().await
            } => written,
        };
        if let Err(e) = written {
            tracing::debug!(connection_id = %id, error = %e, "write failed");
            break;
        }
    }
    queue.close();
    if let Err(e) = writer.shutdown().await {
        tracing::debug!(connection_id = %id, error = %e, "shutdown on close failed");
    }
}

/// Lightweight view of a connection for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    /// Connection identifier.
    pub connection_id: ConnectionId,
    /// Remote address.
    pub peer_addr: SocketAddr,
    /// Handshake progress.
    pub handshake_state: HandshakeState,
    /// Accept timestamp.
    pub connected_at: DateTime<Utc>,
    /// Time of the last inbound payload.
    pub last_activity: DateTime<Utc>,
    /// Messages relayed from this client.
    pub messages_received: u64,
}
