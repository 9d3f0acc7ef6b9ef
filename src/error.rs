//! Error types for the VPoW worker
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for worker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,
    InvalidAddress = 110,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoNotFound = 203,

    // Connection errors (3xx)
    ConnectionFailed = 300,
    ConnectionLost = 301,
    LivenessTimeout = 302,

    // Protocol errors (4xx)
    ProtocolMalformed = 400,

    // Gateway errors (5xx)
    GatewayFailed = 500,
    GatewayCancelled = 501,
    GatewayRejected = 502,
    GatewayPayload = 503,

    // Platform / work-server errors (6xx)
    UnsupportedPlatform = 600,
    WorkServerSpawn = 601,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Connection errors
            400..=499 => 40, // Protocol errors
            500..=599 => 50, // Gateway errors
            600..=699 => 60, // Platform errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the worker
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Address failed format validation; checked before any connection attempt
    #[error("Invalid Vite address: {address}. Expected \"vite_\" followed by 50 lowercase hex digits")]
    InvalidAddress { address: String },

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    // ─────────────────────────────────────────────────────────────
    // Connection Errors
    // ─────────────────────────────────────────────────────────────

    /// Initial handshake with the coordinator failed
    #[error("Failed to connect to {url}: {message}")]
    ConnectionFailed { url: String, message: String },

    /// An established connection dropped
    #[error("Lost connection to coordinator: {message}")]
    ConnectionLost { message: String },

    /// No liveness signal within the deadline; the transport is force-closed
    #[error("No ping from coordinator within {deadline_secs}s")]
    LivenessTimeout { deadline_secs: u64 },

    // ─────────────────────────────────────────────────────────────
    // Protocol Errors
    // ─────────────────────────────────────────────────────────────

    /// Malformed or unrecognized frame; the frame is ignored, never fatal
    #[error("Malformed protocol message: {message}")]
    ProtocolMalformed { message: String },

    // ─────────────────────────────────────────────────────────────
    // Gateway Errors
    // ─────────────────────────────────────────────────────────────

    /// The work-server exchange failed
    #[error("Work-server exchange failed: {message}")]
    GatewayFailed { message: String },

    /// The exchange was aborted by a cancellation
    #[error("Work {hash} cancelled while in flight")]
    GatewayCancelled { hash: String },

    /// The work server answered with a non-success status
    #[error("Work server rejected request: status {status}")]
    GatewayRejected { status: u16 },

    /// The work server answered 200 but the payload was unusable
    #[error("Work server returned an unusable payload: {message}")]
    GatewayPayload { message: String },

    // ─────────────────────────────────────────────────────────────
    // Platform / Work-Server Errors
    // ─────────────────────────────────────────────────────────────

    /// No work-server binary exists for this platform; fatal at startup
    #[error("Platform \"{os} {arch}\" is not supported")]
    UnsupportedPlatform { os: String, arch: String },

    /// The work-server process could not be spawned
    #[error("Failed to launch work server: {message}")]
    WorkServerSpawn { message: String },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::Config(_) => ErrorCode::ConfigValidation,
            Error::InvalidAddress { .. } => ErrorCode::InvalidAddress,

            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::WebSocket(_) => ErrorCode::ConnectionLost,

            Error::ConnectionFailed { .. } => ErrorCode::ConnectionFailed,
            Error::ConnectionLost { .. } => ErrorCode::ConnectionLost,
            Error::LivenessTimeout { .. } => ErrorCode::LivenessTimeout,

            Error::ProtocolMalformed { .. } => ErrorCode::ProtocolMalformed,

            Error::GatewayFailed { .. } => ErrorCode::GatewayFailed,
            Error::GatewayCancelled { .. } => ErrorCode::GatewayCancelled,
            Error::GatewayRejected { .. } => ErrorCode::GatewayRejected,
            Error::GatewayPayload { .. } => ErrorCode::GatewayPayload,

            Error::UnsupportedPlatform { .. } => ErrorCode::UnsupportedPlatform,
            Error::WorkServerSpawn { .. } => ErrorCode::WorkServerSpawn,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is retryable (the reconnect loop handles these)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectionFailed { .. }
                | Error::ConnectionLost { .. }
                | Error::LivenessTimeout { .. }
                | Error::WebSocket(_)
                | Error::Io(_)
        )
    }

    /// Check if the error is fatal (worker should exit)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::Config(_)
                | Error::InvalidAddress { .. }
                | Error::UnsupportedPlatform { .. }
                | Error::WorkServerSpawn { .. }
                | Error::Internal(_)
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'vpow-worker config init' to create a default configuration file."
            ),
            Error::Config(_) => Some(
                "Review the configuration file and fix the invalid values. Run 'vpow-worker config validate' to see details."
            ),
            Error::InvalidAddress { .. } => Some(
                "Usage: vpow-worker run <YOUR_VITE_ADDRESS> 0:0"
            ),

            Error::ConnectionFailed { .. } => Some(
                "Check your network connection and verify the coordinator URL is correct."
            ),
            Error::ConnectionLost { .. } | Error::LivenessTimeout { .. } => Some(
                "Connection was interrupted. The worker will automatically reconnect."
            ),

            Error::UnsupportedPlatform { .. } => Some(
                "No prebuilt work server exists for this platform. Use --rpc-server to run the Python work server instead."
            ),
            Error::WorkServerSpawn { .. } => Some(
                "Verify the work-server path in the configuration, and that the file is executable."
            ),

            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!("\x1b[31mError [{}]\x1b[0m: {}\n", code.as_str(), self);

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a connection failed error
    pub fn connection_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConnectionFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a connection lost error
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Error::ConnectionLost {
            message: message.into(),
        }
    }

    /// Create a gateway failure
    pub fn gateway_failed(message: impl Into<String>) -> Self {
        Error::GatewayFailed {
            message: message.into(),
        }
    }

    /// Create a malformed-protocol error
    pub fn protocol_malformed(message: impl Into<String>) -> Self {
        Error::ProtocolMalformed {
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
