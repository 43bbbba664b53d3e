//! HTTP transport seam.
//!
//! Probe dispatch goes through the [`Transport`] trait so the scheduler and
//! orchestrator can be exercised against a scripted in-memory transport.
//! The production implementation wraps a shared reqwest client with the
//! per-request timeout applied at construction.

use async_trait::async_trait;
use eps_common::Method;
use std::time::Duration;
use thiserror::Error;

/// Errors from probe dispatch. Any of these classifies the probe as
/// CONNECTION_ERROR: no HTTP response was received.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// One outbound probe. Path parameter placeholders (`:id`) are sent
/// literally; a 404 on such a path still means the route is not mounted.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub method: Method,
    pub base_url: String,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub auth_token: Option<String>,
}

impl ProbeRequest {
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.path)
    }
}

/// The only thing the sweeper needs back from the wire.
#[derive(Debug, Clone, Copy)]
pub struct ProbeResponse {
    pub status: u16,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ProbeRequest) -> Result<ProbeResponse, TransportError>;
}

// =========================================================================
// Production transport
// =========================================================================

/// reqwest-backed transport. One shared client per run; connection pooling
/// and the per-request timeout live here.
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ProbeRequest) -> Result<ProbeResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, request.url());
        if let Some(token) = &request.auth_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        match builder.send().await {
            Ok(response) => Ok(ProbeResponse {
                status: response.status().as_u16(),
            }),
            Err(e) if e.is_timeout() => Err(TransportError::Timeout(self.timeout)),
            Err(e) => Err(TransportError::Connect(e.to_string())),
        }
    }
}

// =========================================================================
// Scripted transport for tests
// =========================================================================

pub mod mock {
    //! In-memory transport with scripted per-route behavior. Tracks call
    //! order and the concurrency high-water mark so scheduler tests can
    //! assert the ceiling was honored.

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// What the mock does when a scripted route is hit.
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always answer with this status.
        Status(u16),
        /// Fail as if no response arrived.
        ConnectError,
        /// Answer 200 until the Nth call to this route, 429 from then on.
        RateLimitAfter(u32),
    }

    pub struct MockTransport {
        routes: HashMap<(Method, String), MockBehavior>,
        fallback: MockBehavior,
        latency: Duration,
        call_counts: Mutex<HashMap<(Method, String), u32>>,
        calls: Mutex<Vec<(Method, String)>>,
        in_flight: AtomicUsize,
        high_water: AtomicUsize,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self {
                routes: HashMap::new(),
                fallback: MockBehavior::Status(200),
                latency: Duration::from_millis(10),
                call_counts: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                high_water: AtomicUsize::new(0),
            }
        }

        pub fn route(mut self, method: Method, path: &str, behavior: MockBehavior) -> Self {
            self.routes.insert((method, path.to_string()), behavior);
            self
        }

        pub fn fallback(mut self, behavior: MockBehavior) -> Self {
            self.fallback = behavior;
            self
        }

        pub fn latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        pub fn into_shared(self) -> Arc<Self> {
            Arc::new(self)
        }

        /// Highest number of requests observed in flight at once.
        pub fn high_water(&self) -> usize {
            self.high_water.load(Ordering::SeqCst)
        }

        /// Every call in dispatch order.
        pub fn calls(&self) -> Vec<(Method, String)> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().map(|c| c.len()).unwrap_or(0)
        }
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: &ProbeRequest) -> Result<ProbeResponse, TransportError> {
            let key = (request.method, request.path.clone());

            let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.high_water.fetch_max(in_flight, Ordering::SeqCst);

            if let Ok(mut calls) = self.calls.lock() {
                calls.push(key.clone());
            }
            let count = {
                let mut counts = match self.call_counts.lock() {
                    Ok(c) => c,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let entry = counts.entry(key.clone()).or_insert(0);
                *entry += 1;
                *entry
            };

            tokio::time::sleep(self.latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let behavior = self.routes.get(&key).unwrap_or(&self.fallback);
            match behavior {
                MockBehavior::Status(status) => Ok(ProbeResponse { status: *status }),
                MockBehavior::ConnectError => {
                    Err(TransportError::Connect("connection refused".to_string()))
                }
                MockBehavior::RateLimitAfter(n) => {
                    if count >= *n {
                        Ok(ProbeResponse { status: 429 })
                    } else {
                        Ok(ProbeResponse { status: 200 })
                    }
                }
            }
        }
    }
}
