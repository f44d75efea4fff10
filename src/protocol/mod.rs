//! Wire protocol: the opening handshake and payload decoding.
//!
//! The relay speaks only the key/accept exchange of the RFC 6455 opening
//! handshake. After it, payloads are forwarded as raw byte chunks without
//! frame headers.

pub mod handshake;
pub mod payload;

pub use handshake::HandshakeError;
