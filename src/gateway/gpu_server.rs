//! pow-gpu binary-service backend
//!
//! Speaks the work server's minimal JSON protocol: one `POST /` per
//! exchange with `{action, hash, threshold}`, answered by `{work}`. The
//! server also exposes a cancel endpoint taking `{action: "work_cancel",
//! hash}`, so a coordinator-side cancellation reaches the GPU kernel and not
//! just our local wait.

use std::time::Duration;

use async_trait::async_trait;
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
struct GenerateRequest<'a> {
    action: &'a str,
    hash: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    threshold: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    work: String,
}

#[derive(Debug, Serialize)]
struct CancelRequest<'a> {
    action: &'a str,
    hash: &'a str,
}

// ─────────────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────────────

/// Gateway to the pow-gpu work server
pub struct GpuServerGateway {
    client: Client,
    endpoint: String,
}

impl GpuServerGateway {
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
        let body = GenerateRequest {
            action: "work_generate",
            hash: &params.hash,
            threshold: params.threshold.as_deref(),
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

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::GatewayPayload {
                message: e.to_string(),
            })?;

        Ok(Nonce(parsed.work))
    }
}

#[async_trait]
impl WorkGateway for GpuServerGateway {
    fn name(&self) -> &'static str {
        "gpu-server"
    }

    fn supports_cancel(&self) -> bool {
        true
    }

    async fn compute(&self, params: WorkParams, cancel: CancelSignal) -> Result<Nonce> {
        let hash = params.hash.clone();

        // Dropping the in-flight request aborts its socket, so a cancel
        // tears the exchange down rather than letting it linger.
        tokio::select! {
            result = self.exchange(&params) => result,
            _ = cancel.cancelled() => {
                debug!(hash = %hash, "Exchange aborted by cancellation");
                Err(Error::GatewayCancelled { hash })
            }
        }
    }

    async fn notify_cancel(&self, hash: &str) -> Result<()> {
        let body = CancelRequest {
            action: "work_cancel",
            hash,
        };

        self.client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::gateway_failed(e.to_string()))?;

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
