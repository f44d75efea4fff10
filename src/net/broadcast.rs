//! Fan-out of a message to every registered connection.

use std::sync::Arc;

use crate::domain::{ConnectionId, ConnectionRegistry};

/// Result of one broadcast call.
///
/// Diagnostic only: relaying never acts on it. It feeds the trace line
/// emitted per broadcast and lets host code see how many recipients were
/// skipped because they were closed or not reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections a send was issued to.
    pub attempted: usize,
    /// Sends accepted into a recipient's outbound queue.
    pub delivered: usize,
}

/// Sends payloads to a registry snapshot.
///
/// Sends only enqueue, so a broadcast never waits on a peer. Per-recipient
/// failures (closed connection, full queue) are logged and swallowed: a
/// dead peer is reaped by its own receive loop, never by the broadcaster.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    exclude_sender: bool,
}

impl Broadcaster {
    /// Creates a broadcaster over `registry`.
    #[must_use]
    pub const fn new(registry: Arc<ConnectionRegistry>, exclude_sender: bool) -> Self {
        Self {
            registry,
            exclude_sender,
        }
    }

    /// Sends `payload` to every connection in a fresh snapshot, in
    /// snapshot order.
    ///
    /// `sender` is skipped only when the broadcaster was built with
    /// `exclude_sender`.
    pub async fn broadcast(&self, payload: &[u8], sender: Option<ConnectionId>) -> BroadcastReport {
        let snapshot = self.registry.snapshot().await;
        let shared: Arc<[u8]> = Arc::from(payload);
        let mut report = BroadcastReport::default();

        for connection in &snapshot {
            if self.exclude_sender && sender == Some(connection.id()) {
                continue;
            }
            report.attempted += 1;
            match connection.send(Arc::clone(&shared)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::debug!(
                        connection_id = %connection.id(),
                        error = %e,
                        "broadcast send failed"
                    );
                }
            }
        }

        tracing::trace!(
            attempted = report.attempted,
            delivered = report.delivered,
            len = payload.len(),
            "broadcast complete"
        );
        report
    }
}
