//! Domain layer: connection identity, the connection registry, the
//! message log, and the event system.
//!
//! The registry is the only shared mutable membership state of the relay;
//! the message log and event bus form the observer interface.

pub mod connection;
pub mod connection_id;
pub mod connection_registry;
pub mod event_bus;
pub mod message_log;
pub mod relay_event;

pub use connection::{
    BoxedWriter, Connection, ConnectionSummary, HandshakeState, OUTBOUND_QUEUE_CAPACITY,
};
pub use connection_id::ConnectionId;
pub use connection_registry::ConnectionRegistry;
pub use event_bus::EventBus;
pub use message_log::{LoggedMessage, MessageLog};
pub use relay_event::{DisconnectReason, RelayEvent};
