//! Ordered log of received messages.
//!
//! [`MessageLog`] is the observer interface of the relay. Every message
//! that reaches the broadcast path is appended here with a monotonically
//! increasing sequence number, and the matching
//! [`RelayEvent::MessageReceived`] is published while the log lock is
//! held, so subscribers observe messages in exactly log order.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use super::{ConnectionId, EventBus, RelayEvent};

/// One received message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggedMessage {
    /// Position in the log, starting at 1.
    pub seq: u64,
    /// Sending connection.
    pub connection_id: ConnectionId,
    /// Decoded message text.
    pub text: String,
    /// Receive timestamp.
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct LogState {
    entries: VecDeque<LoggedMessage>,
    next_seq: u64,
}

/// Append-only, bounded message log.
///
/// Sequence numbers are never reused. Once `capacity` entries are held,
/// each append evicts the oldest entry.
#[derive(Debug)]
pub struct MessageLog {
    state: Mutex<LogState>,
    capacity: usize,
    event_bus: EventBus,
}

impl MessageLog {
    /// Creates an empty log retaining at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize, event_bus: EventBus) -> Self {
        Self {
            state: Mutex::new(LogState {
                entries: VecDeque::with_capacity(capacity.min(1024)),
                next_seq: 1,
            }),
            capacity: capacity.max(1),
            event_bus,
        }
    }

    /// Appends a message and publishes it on the event bus.
    pub async fn append(&self, connection_id: ConnectionId, text: String) -> LoggedMessage {
        let mut state = self.state.lock().await;
        let message = LoggedMessage {
            seq: state.next_seq,
            connection_id,
            text,
            received_at: Utc::now(),
        };
        state.next_seq += 1;
        if state.entries.len() == self.capacity {
            state.entries.pop_front();
        }
        state.entries.push_back(message.clone());
        self.event_bus.publish(RelayEvent::MessageReceived {
            seq: message.seq,
            connection_id,
            text: message.text.clone(),
            timestamp: message.received_at,
        });
        message
    }

    /// Returns every retained message, oldest first.
    pub async fn snapshot(&self) -> Vec<LoggedMessage> {
        self.state.lock().await.entries.iter().cloned().collect()
    }

    /// Returns one page of retained messages (1-indexed) and the total
    /// number retained.
    pub async fn page(&self, page: u32, per_page: u32) -> (Vec<LoggedMessage>, usize) {
        let state = self.state.lock().await;
        let per_page = per_page.max(1) as usize;
        let skip = (page.max(1) as usize - 1).saturating_mul(per_page);
        let items = state
            .entries
            .iter()
            .skip(skip)
            .take(per_page)
            .cloned()
            .collect();
        (items, state.entries.len())
    }

    /// Returns the number of retained messages.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Returns `true` if no message is retained.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }
}
