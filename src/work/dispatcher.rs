//! Work dispatch and result delivery
//!
//! Consumes decoded coordinator messages and drives gateway exchanges. Each
//! exchange runs as its own task; its outcome funnels back over an mpsc
//! channel into the same event loop that processes messages, so all table
//! mutations happen synchronously within one handler step. That makes the
//! cancel/result race safe in both directions: a result for a hash the table
//! no longer holds is discarded, never sent.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::gateway::WorkGateway;
use crate::protocol::{Message, WorkAcceptedMessage, WorkResponseMessage};
use crate::types::{cancellation, Nonce, WorkParams};

use super::WorkTable;

/// Resolution of one gateway exchange
#[derive(Debug)]
pub struct WorkOutcome {
    /// Hash the exchange was for
    pub hash: String,

    /// The computed nonce, or why there is none
    pub result: Result<Nonce>,
}

/// Coordinates in-flight work between the connection and the gateway
pub struct WorkDispatcher {
    table: WorkTable,
    gateway: Arc<dyn WorkGateway>,
    outcome_tx: mpsc::Sender<WorkOutcome>,
}

impl WorkDispatcher {
    /// Create a dispatcher and the outcome receiver its exchanges report to
    pub fn new(
        gateway: Arc<dyn WorkGateway>,
        queue_size: usize,
    ) -> (Self, mpsc::Receiver<WorkOutcome>) {
        let (outcome_tx, outcome_rx) = mpsc::channel(queue_size);

        (
            Self {
                table: WorkTable::new(),
                gateway,
                outcome_tx,
            },
            outcome_rx,
        )
    }

    /// Route one decoded coordinator message
    pub fn handle_message(&mut self, message: Message) {
        match message {
            Message::WorkGenerate(params) => self.handle_generate(params),
            Message::WorkCancel(cancel) => self.handle_cancel(&cancel.hash),
            Message::WorkAccepted(accepted) => self.handle_accepted(&accepted),
            // Ping is answered inside the connection layer; the remaining
            // variants are worker-to-coordinator and never arrive here.
            other => debug!(action = %other.action(), "Ignoring unexpected message"),
        }
    }

    /// Register a work assignment and start its gateway exchange
    pub fn handle_generate(&mut self, params: WorkParams) {
        let hash = params.hash.clone();
        let (handle, signal) = cancellation();

        if self.table.insert(hash.clone(), handle).is_some() {
            // Last writer wins, as in the reference coordinator protocol:
            // the earlier exchange keeps running with no way to cancel it,
            // and whichever outcome arrives first delivers the result.
            warn!(hash = %hash, "Duplicate work request; replacing in-flight handle");
        }

        debug!(hash = %hash, gateway = self.gateway.name(), "Dispatching work");

        let gateway = self.gateway.clone();
        let outcome_tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = gateway.compute(params, signal).await;
            let _ = outcome_tx.send(WorkOutcome { hash, result }).await;
        });
    }

    /// Cancel an in-flight work item. Unknown hashes are a no-op.
    pub fn handle_cancel(&mut self, hash: &str) {
        let Some(entry) = self.table.take(hash) else {
            debug!(hash = %hash, "Cancel for unknown work; ignoring");
            return;
        };

        entry.cancel.cancel();
        info!(hash = %hash, "Work cancelled");

        // Tell the work server too, so it stops burning the GPU on a hash
        // nobody wants. Best-effort; some backends have no cancel endpoint.
        if self.gateway.supports_cancel() {
            let gateway = self.gateway.clone();
            let hash = hash.to_string();
            tokio::spawn(async move {
                if let Err(e) = gateway.notify_cancel(&hash).await {
                    debug!(hash = %hash, error = %e, "Cancel notification failed");
                }
            });
        }
    }

    /// Surface a payout notification. No state change.
    pub fn handle_accepted(&self, accepted: &WorkAcceptedMessage) {
        info!("{}:Accepted:{}", accepted.hash, accepted.payout.join(" "));
    }

    /// Resolve one finished exchange. Returns the response to send, if the
    /// work item was still live and the exchange succeeded. The check and
    /// the removal are one synchronous step, so a result racing a
    /// cancellation can never be sent after the cancel won.
    pub fn handle_outcome(&mut self, outcome: WorkOutcome) -> Option<Message> {
        let entry = self.table.take(&outcome.hash);

        match outcome.result {
            Ok(nonce) => match entry {
                Some(entry) => {
                    info!(
                        hash = %outcome.hash,
                        nonce = %nonce,
                        elapsed_ms = entry.received_at.elapsed().as_millis() as u64,
                        "Work solved"
                    );
                    Some(Message::Response(WorkResponseMessage {
                        hash: outcome.hash,
                        nonce: nonce.0,
                    }))
                }
                None => {
                    debug!(hash = %outcome.hash, "Late result for removed work; discarding");
                    None
                }
            },
            Err(e) => {
                if entry.is_some() {
                    // Fire-and-forget: the coordinator re-issues or times
                    // the work out, we never retry locally.
                    warn!(hash = %outcome.hash, error = %e, "Work exchange failed; leaving unanswered");
                } else {
                    debug!(hash = %outcome.hash, "Exchange resolved after cancellation");
                }
                None
            }
        }
    }

    /// Number of in-flight work items
    pub fn in_flight(&self) -> usize {
        self.table.len()
    }

    /// Whether a hash is currently in flight
    pub fn is_in_flight(&self, hash: &str) -> bool {
        self.table.contains(hash)
    }

    /// Hashes currently in flight
    pub fn active_hashes(&self) -> Vec<String> {
        self.table.active_hashes()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
