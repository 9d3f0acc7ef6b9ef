//! Python script-service backend
//!
//! Speaks the JSON-RPC shape of the fallback work server: `POST /` with a
//! `util_getPoWNonce` envelope, answered by `{result}` carrying a base64
//! nonce (or the literal string "input error"). The nonce is re-encoded as
//! hex before it goes back to the coordinator. There is no cancel endpoint:
//! cancellation only aborts the local wait, the server keeps searching.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{CancelSignal, Nonce, WorkParams};

use super::WorkGateway;

// ─────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u32,
    method: &'static str,
    params: [&'a str; 2],
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
}

// ─────────────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────────────

/// Gateway to the Python JSON-RPC work server
pub struct RpcServerGateway {
    client: Client,
    endpoint: String,
}

impl RpcServerGateway {
    /// Create a gateway bound to the work server's loopback port
    pub fn new(port: u16, timeout: Option<Duration>) -> Self {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Self {
            client: builder.build().expect("Failed to create HTTP client"),
            endpoint: format!("http://127.0.0.1:{}/", port),
        }
    }

    async fn exchange(&self, params: &WorkParams) -> Result<Nonce> {
        let body = RpcRequest {
            jsonrpc: "2.0",
            id: 0,
            method: "util_getPoWNonce",
            params: [
                params.difficulty.as_deref().unwrap_or_default(),
                params.hash.as_str(),
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("accept", "text/plain;charset=UTF-8")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::gateway_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::GatewayRejected {
                status: status.as_u16(),
            });
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| Error::GatewayPayload {
                message: e.to_string(),
            })?;

        decode_result(parsed)
    }
}

/// Turn an RPC result into a hex nonce
fn decode_result(response: RpcResponse) -> Result<Nonce> {
    let result = response.result.ok_or_else(|| Error::GatewayPayload {
        message: "missing result field".to_string(),
    })?;

    if result == "input error" {
        return Err(Error::GatewayPayload {
            message: "input error".to_string(),
        });
    }

    let bytes = BASE64.decode(&result).map_err(|e| Error::GatewayPayload {
        message: format!("invalid base64 nonce: {}", e),
    })?;

    Ok(Nonce(hex::encode(bytes)))
}

#[async_trait]
impl WorkGateway for RpcServerGateway {
    fn name(&self) -> &'static str {
        "rpc-server"
    }

    fn supports_cancel(&self) -> bool {
        false
    }

    async fn compute(&self, params: WorkParams, cancel: CancelSignal) -> Result<Nonce> {
        let hash = params.hash.clone();

        tokio::select! {
            result = self.exchange(&params) => result,
            _ = cancel.cancelled() => {
                debug!(hash = %hash, "Exchange aborted by cancellation (server keeps searching)");
                Err(Error::GatewayCancelled { hash })
            }
        }
    }

    async fn notify_cancel(&self, _hash: &str) -> Result<()> {
        // No cancel endpoint on this backend
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_request_shape() {
        let body = RpcRequest {
            jsonrpc: "2.0",
            id: 0,
            method: "util_getPoWNonce",
            params: ["67108863", "H1"],
        };
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 0);
        assert_eq!(json["method"], "util_getPoWNonce");
        assert_eq!(json["params"][0], "67108863");
        assert_eq!(json["params"][1], "H1");
    }

    #[test]
    fn test_decode_base64_result_to_hex() {
        // base64 of bytes [0xab, 0xc1, 0x23]
        let nonce = decode_result(RpcResponse {
            result: Some("q8Ej".to_string()),
        })
        .unwrap();
        assert_eq!(nonce.as_str(), "abc123");
    }

    #[test]
    fn test_input_error_is_failure() {
        let err = decode_result(RpcResponse {
            result: Some("input error".to_string()),
        })
        .unwrap_err();
        assert!(matches!(err, Error::GatewayPayload { .. }));
    }

    #[test]
    fn test_missing_result_is_failure() {
        let err = decode_result(RpcResponse { result: None }).unwrap_err();
        assert!(matches!(err, Error::GatewayPayload { .. }));
    }

    #[test]
    fn test_invalid_base64_is_failure() {
        let err = decode_result(RpcResponse {
            result: Some("!!not-base64!!".to_string()),
        })
        .unwrap_err();
        assert!(matches!(err, Error::GatewayPayload { .. }));
    }
}
