//! Lifecycle and message events published on the [`super::EventBus`].
//!
//! Hosts subscribe to these to observe the relay: the presentation layer
//! consumes `MessageReceived` in arrival order, diagnostics use the rest.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ConnectionId;

/// Why a connection left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The client closed its side, or the server closed the connection.
    Closed,
    /// A transport or handshake error ended the connection.
    Failed,
}

/// Event emitted by the relay.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum RelayEvent {
    /// A client was accepted and registered.
    ClientConnected {
        /// Connection identifier.
        connection_id: ConnectionId,
        /// Remote address.
        peer_addr: SocketAddr,
        /// Accept timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A client completed the upgrade handshake.
    HandshakeCompleted {
        /// Connection identifier.
        connection_id: ConnectionId,
        /// Completion timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A message was received and logged before broadcast.
    MessageReceived {
        /// Position in the message log.
        seq: u64,
        /// Sending connection.
        connection_id: ConnectionId,
        /// Decoded message text.
        text: String,
        /// Receive timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A client left the registry.
    ClientDisconnected {
        /// Connection identifier.
        connection_id: ConnectionId,
        /// How the connection ended.
        reason: DisconnectReason,
        /// Disconnect timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl RelayEvent {
    /// Returns the connection this event concerns.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        match self {
            Self::ClientConnected { connection_id, .. }
            | Self::HandshakeCompleted { connection_id, .. }
            | Self::MessageReceived { connection_id, .. }
            | Self::ClientDisconnected { connection_id, .. } => *connection_id,
        }
    }
}
