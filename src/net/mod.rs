//! Network layer: the TCP listener, per-connection receive loops, and the
//! broadcast fan-out.

pub mod broadcast;
pub mod listener;
pub mod receive_loop;

pub use broadcast::{BroadcastReport, Broadcaster};
pub use receive_loop::{LoopOutcome, ReceiveContext};
