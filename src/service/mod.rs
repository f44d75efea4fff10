//! Service layer: the relay server and its lifecycle.
//!
//! [`RelayServer`] wires the registry, broadcaster, message log and event
//! bus together and owns the accept loop between `start()` and `stop()`.

pub mod relay_server;

pub use relay_server::RelayServer;
