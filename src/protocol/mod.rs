//! Protocol module for coordinator communication
//!
//! Defines the message types and serialization for the worker-coordinator
//! protocol. The protocol is JSON text frames over WebSocket, one message per
//! frame, discriminated by the `action` field.

mod messages;

pub use messages::*;
