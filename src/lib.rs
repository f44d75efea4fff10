//! # relay-gateway
//!
//! Minimal real-time message relay. Clients connect over TCP, perform the
//! key/accept part of the WebSocket opening handshake, and every message
//! they send afterwards is rebroadcast to all connected clients.
//!
//! Post-handshake traffic is relayed as raw byte chunks, not RFC 6455
//! frames.
//!
//! ## Architecture
//!
//! ```text
//! Clients (TCP)                 Operators (HTTP)
//!     │                               │
//!     ├── Listener (net/)             ├── Admin API (api/)
//!     ├── Receive loops (net/)        │
//!     │     ├── Handshake (protocol/) │
//!     │     └── Broadcaster (net/)    │
//!     │                               │
//!     ├── RelayServer (service/) ─────┘
//!     │
//!     ├── ConnectionRegistry (domain/)
//!     └── MessageLog + EventBus (domain/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod net;
pub mod protocol;
pub mod service;
