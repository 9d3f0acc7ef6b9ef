//! Protocol message definitions
//!
//! All message types exchanged with the VPoW coordinator. Frames are JSON
//! objects tagged by `action`; unknown actions and malformed frames are
//! ignored by the receiver rather than treated as connection errors.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::WorkParams;

// ─────────────────────────────────────────────────────────────────
// Message Types (Discriminated Union)
// ─────────────────────────────────────────────────────────────────

/// All protocol messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Message {
    // ─── Coordinator → Worker ───────────────────────────────────
    /// Liveness probe; answered with a `Pong` carrying the current time
    Ping,

    /// Work assignment
    WorkGenerate(WorkParams),

    /// Cancel a previously assigned hash
    WorkCancel(WorkCancelMessage),

    /// A submitted nonce was accepted and paid out
    WorkAccepted(WorkAcceptedMessage),

    // ─── Worker → Coordinator ───────────────────────────────────
    /// Liveness reply with the worker's current epoch-ms timestamp
    Pong { d: i64 },

    /// Computed nonce for an assigned hash
    Response(WorkResponseMessage),
}

impl Message {
    /// Build a pong stamped with the current time
    pub fn pong_now() -> Self {
        Message::Pong {
            d: Utc::now().timestamp_millis(),
        }
    }

    /// Get the wire action name
    pub fn action(&self) -> &'static str {
        match self {
            Message::Ping => "ping",
            Message::Pong { .. } => "pong",
            Message::WorkGenerate(_) => "work_generate",
            Message::WorkCancel(_) => "work_cancel",
            Message::WorkAccepted(_) => "work_accepted",
            Message::Response(_) => "response",
        }
    }

    /// Check if this message flows coordinator → worker
    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            Message::Ping
                | Message::WorkGenerate(_)
                | Message::WorkCancel(_)
                | Message::WorkAccepted(_)
        )
    }

    /// Check if this message flows worker → coordinator
    pub fn is_outbound(&self) -> bool {
        !self.is_inbound()
    }

    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from a JSON text frame
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Deserialize from JSON bytes
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

// ─────────────────────────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────────────────────────

/// Cancellation of an assigned hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkCancelMessage {
    /// Hash whose computation is no longer needed
    pub hash: String,
}

/// Payout notification for an accepted nonce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkAcceptedMessage {
    /// Hash the accepted nonce belongs to
    pub hash: String,

    /// Payout amounts, as decimal strings
    #[serde(default)]
    pub payout: Vec<String>,
}

/// Computed nonce submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkResponseMessage {
    /// Hash the nonce was computed for
    pub hash: String,

    /// Hex-encoded nonce
    pub nonce: String,
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
