//! Gateway trait definition
//!
//! A gateway performs a single request/response exchange with the local work
//! server per work item. Exchanges must observe the cancel signal and abort
//! promptly instead of hanging until the server answers.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CancelSignal, Nonce, WorkParams};

/// Request/response channel to the local work server
#[async_trait]
pub trait WorkGateway: Send + Sync {
    /// Name of the backend
    fn name(&self) -> &'static str;

    /// Whether the backend has an out-of-band cancel endpoint
    fn supports_cancel(&self) -> bool;

    /// Run one work exchange. Resolves with the computed nonce, or with
    /// `Error::GatewayCancelled` as soon as the cancel signal fires.
    async fn compute(&self, params: WorkParams, cancel: CancelSignal) -> Result<Nonce>;

    /// Tell the work server a hash is no longer needed. Best-effort: callers
    /// swallow failures, and backends without a cancel endpoint return Ok.
    async fn notify_cancel(&self, hash: &str) -> Result<()>;
}
