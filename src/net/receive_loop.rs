//! Per-connection receive loop.
//!
//! Each connection runs one loop in its own task: read a chunk, route it
//! (handshake once, broadcast thereafter), repeat. The loop ends on EOF,
//! on a transport or handshake error, or when the connection is closed
//! through the registry. Whatever the cause, the connection leaves the
//! registry before the loop returns.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use super::Broadcaster;
use crate::domain::{
    Connection, ConnectionRegistry, DisconnectReason, EventBus, HandshakeState, MessageLog,
    RelayEvent,
};
use crate::error::RelayError;
use crate::protocol::handshake::FirstPayload;
use crate::protocol::{HandshakeError, handshake, payload};

/// Shared collaborators of every receive loop.
#[derive(Debug, Clone)]
pub struct ReceiveContext {
    /// Connection membership.
    pub registry: Arc<ConnectionRegistry>,
    /// Fan-out for relayed messages.
    pub broadcaster: Broadcaster,
    /// Observer log of relayed messages.
    pub message_log: Arc<MessageLog>,
    /// Lifecycle event channel.
    pub event_bus: EventBus,
    /// Upper bound for one read and for a buffered handshake request.
    pub max_frame_bytes: usize,
    /// Optional idle-read timeout.
    pub idle_timeout: Option<Duration>,
    /// Time allowed to finish a request head once its first bytes arrive.
    pub handshake_timeout: Duration,
}

/// Terminal state of a receive loop.
#[derive(Debug)]
pub enum LoopOutcome {
    /// End of stream, or the connection was closed by the server.
    Closed,
    /// The loop stopped on an error.
    Failed(RelayError),
}

/// Runs the read → route → re-arm cycle for one connection.
///
/// `reader` is the read half of the transport whose write half is held by
/// `connection`.
pub async fn run_receive_loop<R>(
    mut reader: R,
    connection: Arc<Connection>,
    ctx: ReceiveContext,
) -> LoopOutcome
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; ctx.max_frame_bytes.max(1)];
    let mut pending = Vec::new();
    // Set while a partial request head is buffered.
    let mut head_deadline: Option<Instant> = None;

    let outcome = loop {
        let deadline = head_deadline.unwrap_or_else(Instant::now);
        let read = tokio::select! {
            biased;
            () = connection.cancelled() => break LoopOutcome::Closed,
            () = tokio::time::sleep_until(deadline), if head_deadline.is_some() => {
                break LoopOutcome::Failed(
                    HandshakeError::Timeout {
                        waited: ctx.handshake_timeout,
                    }
                    .into(),
                )
            }
            read = read_chunk(&mut reader, &mut chunk, ctx.idle_timeout) => read,
        };
        let n = match read {
            Ok(0) => break LoopOutcome::Closed,
            Ok(n) => n,
            Err(e) => break LoopOutcome::Failed(RelayError::Transport(e)),
        };
        connection.touch();
        let chunk_payload = chunk.get(..n).unwrap_or_default();
        if let Err(e) = route_payload(&connection, chunk_payload, &mut pending, &ctx).await {
            break LoopOutcome::Failed(e);
        }
        if pending.is_empty() {
            head_deadline = None;
        } else if head_deadline.is_none() {
            head_deadline = Some(Instant::now() + ctx.handshake_timeout);
        }
    };

    let id = connection.id();
    let reason = match &outcome {
        LoopOutcome::Closed => {
            tracing::info!(connection_id = %id, "client disconnected");
            DisconnectReason::Closed
        }
        LoopOutcome::Failed(e) => {
            tracing::warn!(connection_id = %id, error = %e, "client connection failed");
            DisconnectReason::Failed
        }
    };
    ctx.registry.remove(id).await;
    connection.close().await;
    ctx.event_bus.publish(RelayEvent::ClientDisconnected {
        connection_id: id,
        reason,
        timestamp: Utc::now(),
    });
    outcome
}

async fn read_chunk<R>(
    reader: &mut R,
    buf: &mut [u8],
    idle_timeout: Option<Duration>,
) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, reader.read(buf))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "idle timeout"))?,
        None => reader.read(buf).await,
    }
}

/// Sends one chunk down the handshake path or the broadcast path.
///
/// Before the upgrade, bytes accumulate in `pending` until they can be
/// classified and, for an upgrade request, until the head is complete.
async fn route_payload(
    connection: &Connection,
    chunk: &[u8],
    pending: &mut Vec<u8>,
    ctx: &ReceiveContext,
) -> Result<(), RelayError> {
    if connection.handshake_state() != HandshakeState::Pending {
        relay_message(connection, chunk, ctx).await;
        return Ok(());
    }

    pending.extend_from_slice(chunk);
    match handshake::classify(pending) {
        FirstPayload::Upgrade => {}
        FirstPayload::Undecided => return Ok(()),
        FirstPayload::Message => {
            connection.mark_passthrough();
            tracing::debug!(connection_id = %connection.id(), "first payload is not an upgrade request");
            let message = std::mem::take(pending);
            relay_message(connection, &message, ctx).await;
            return Ok(());
        }
    }

    handshake::check_request_line(pending)?;
    let Some(head_len) = handshake::head_len(pending) else {
        if pending.len() > ctx.max_frame_bytes {
            return Err(HandshakeError::RequestTooLarge {
                limit: ctx.max_frame_bytes,
            }
            .into());
        }
        return Ok(());
    };

    let trailing = pending.split_off(head_len);
    let head = std::mem::take(pending);
    let response = handshake::respond(&head)?;
    connection.send(Arc::from(response.as_bytes()))?;
    connection.mark_upgraded();
    tracing::info!(connection_id = %connection.id(), "handshake completed");
    ctx.event_bus.publish(RelayEvent::HandshakeCompleted {
        connection_id: connection.id(),
        timestamp: Utc::now(),
    });

    if !trailing.is_empty() {
        relay_message(connection, &trailing, ctx).await;
    }
    Ok(())
}

/// Logs and broadcasts one message.
async fn relay_message(connection: &Connection, message: &[u8], ctx: &ReceiveContext) {
    let text = payload::text_or_placeholder(message);
    connection.record_message();
    tracing::debug!(connection_id = %connection.id(), len = message.len(), "message received");
    ctx.message_log.append(connection.id(), text.clone()).await;
    ctx.broadcaster
        .broadcast(text.as_bytes(), Some(connection.id()))
        .await;
}
