//! Work item types
//!
//! A work item is identified by its hash. The difficulty parameters are
//! opaque to the worker: they are forwarded verbatim to whichever work-server
//! backend is active (the binary service consumes `threshold`, the script
//! service consumes `difficulty`).

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Parameters of one proof-of-work request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkParams {
    /// The hash to compute a nonce for; unique among in-flight items
    pub hash: String,

    /// Threshold parameter (binary-service backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<String>,

    /// Difficulty parameter (script-service backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
}

/// A computed nonce, hex-encoded as the coordinator expects it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce(pub String);

impl Nonce {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Create a linked cancellation pair. The handle is stored in the in-flight
/// table; the signal travels into the gateway exchange.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = oneshot::channel();
    (CancelHandle(tx), CancelSignal(rx))
}

/// Owner side of a cancellation: firing it aborts the paired exchange
#[derive(Debug)]
pub struct CancelHandle(oneshot::Sender<()>);

impl CancelHandle {
    /// Signal the paired exchange to abort
    pub fn cancel(self) {
        let _ = self.0.send(());
    }
}

/// Exchange side of a cancellation
#[derive(Debug)]
pub struct CancelSignal(oneshot::Receiver<()>);

impl CancelSignal {
    /// Resolve when an explicit cancel is fired.
    ///
    /// A dropped handle means no cancel will ever arrive for this exchange
    /// (the work item was replaced in the table); the exchange keeps running.
    pub async fn cancelled(self) {
        match self.0.await {
            Ok(()) => {}
            Err(_) => std::future::pending().await,
        }
    }
}
