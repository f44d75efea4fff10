//! Broadcast channel for relay events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. It is the single
//! observation channel of the relay: every lifecycle change and every
//! received message is published here in the order it happened.

use tokio::sync::broadcast;

use super::RelayEvent;

/// Broadcast bus for [`RelayEvent`]s.
///
/// When the ring buffer is full, the oldest events are dropped for lagging
/// receivers; the [`super::MessageLog`] keeps the authoritative copy of
/// received messages.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RelayEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; [`crate::config::RelayConfig`] rejects
    /// that value before it gets here.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    pub fn publish(&self, event: RelayEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
