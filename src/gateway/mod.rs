//! Work-server gateway
//!
//! The actual proof-of-work search runs in an external process on loopback.
//! This module provides the request/response abstraction over it and the
//! lifecycle of the process itself:
//! - The `WorkGateway` trait with cooperative cancellation
//! - The pow-gpu binary backend (minimal JSON, explicit cancel endpoint)
//! - The Python script backend (JSON-RPC, local abort only)
//! - Spawning and guaranteed teardown of the work-server process

mod gpu_server;
mod process;
mod rpc_server;
mod traits;

use std::sync::Arc;
use std::time::Duration;

pub use gpu_server::GpuServerGateway;
pub use process::{derive_port, platform_binary_name, WorkServerProcess};
pub use rpc_server::RpcServerGateway;
pub use traits::WorkGateway;

use crate::config::{GatewayBackendKind, GatewaySettings};

/// Build the gateway matching the configured backend
pub fn create_gateway(settings: &GatewaySettings, port: u16) -> Arc<dyn WorkGateway> {
    let timeout = if settings.request_timeout_secs > 0 {
        Some(Duration::from_secs(settings.request_timeout_secs))
    } else {
        None
    };

    match settings.backend {
        GatewayBackendKind::GpuServer => Arc::new(GpuServerGateway::new(port, timeout)),
        GatewayBackendKind::RpcServer => Arc::new(RpcServerGateway::new(port, timeout)),
    }
}
