//! Coordinator communication module
//!
//! Handles the WebSocket connection to the VPoW coordinator, including:
//! - Connection establishment with unconditional fixed-delay reconnect
//! - Liveness deadline monitoring (ping/pong)
//! - Decoded message event stream and outbound sends

mod client;

pub use client::*;
