//! Single-probe execution: dispatch one descriptor, time it, classify it.
//!
//! Exactly one result per descriptor. There are no retries; a flaky
//! endpoint showing up as a failure is signal, not noise.

use crate::transport::{ProbeRequest, Transport, TransportError};
use chrono::Utc;
use eps_common::{EndpointDescriptor, Outcome, ProbeResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub struct ProbeExecutor {
    transport: Arc<dyn Transport>,
    base_url: String,
    auth_token: Option<String>,
}

impl ProbeExecutor {
    pub fn new(transport: Arc<dyn Transport>, base_url: String, auth_token: Option<String>) -> Self {
        Self {
            transport,
            base_url,
            auth_token,
        }
    }

    /// Probe one endpoint and classify the outcome.
    ///
    /// Transport failures never propagate: no response at all is itself a
    /// classification, CONNECTION_ERROR.
    pub async fn probe(&self, endpoint: &EndpointDescriptor) -> ProbeResult {
        let request = ProbeRequest {
            method: endpoint.method,
            base_url: self.base_url.clone(),
            path: endpoint.path.clone(),
            body: endpoint.body.clone(),
            auth_token: self.auth_token.clone(),
        };

        let started = Instant::now();
        let outcome = self.transport.send(&request).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(response) => {
                let outcome = Outcome::classify(
                    response.status,
                    endpoint.requires_auth,
                    self.auth_token.is_some(),
                );
                ProbeResult {
                    method: endpoint.method,
                    path: endpoint.path.clone(),
                    phase: endpoint.phase.clone(),
                    outcome,
                    http_status: Some(response.status),
                    latency_ms,
                    error_detail: None,
                    timestamp: Utc::now(),
                }
            }
            Err(error) => ProbeResult {
                method: endpoint.method,
                path: endpoint.path.clone(),
                phase: endpoint.phase.clone(),
                outcome: Outcome::ConnectionError,
                http_status: None,
                latency_ms,
                error_detail: Some(error_detail(&error)),
                timestamp: Utc::now(),
            },
        };

        debug!(
            endpoint = %endpoint,
            outcome = %result.outcome,
            status = ?result.http_status,
            latency_ms = result.latency_ms,
            "Probe completed"
        );

        result
    }
}

fn error_detail(error: &TransportError) -> String {
    match error {
        TransportError::Timeout(timeout) => format!("timed out after {timeout:?}"),
        TransportError::Connect(detail) => detail.clone(),
        TransportError::Client(detail) => detail.clone(),
    }
}
