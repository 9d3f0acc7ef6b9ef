//! Work coordination module
//!
//! Tracks the set of in-flight work items and drives their lifecycle:
//! - Registering assignments and dispatching them to the gateway
//! - Cancelling in-flight exchanges
//! - Deciding result delivery when an exchange resolves

mod dispatcher;
mod state;

pub use dispatcher::*;
pub use state::*;
