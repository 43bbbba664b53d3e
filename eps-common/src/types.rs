//! Core types shared across sweeper components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// HTTP method of an endpoint descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        write!(f, "{value}")
    }
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(format!("unknown HTTP method: {other}")),
        }
    }
}

/// A single endpoint to probe.
///
/// Immutable once constructed; owned by the catalog. Paths may contain
/// parameter placeholders (`/api/v1/widgets/:id`) which are sent literally —
/// a 404 on a parameterized path still means the route is not mounted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub method: Method,
    pub path: String,
    /// Name of the phase this descriptor belongs to (stamped at catalog
    /// construction time).
    #[serde(default)]
    pub phase: String,
    /// Whether the endpoint is expected to be auth-gated. 401/403 on an
    /// unauthenticated descriptor is an expected skip, not a failure.
    #[serde(default)]
    pub requires_auth: bool,
    /// Optional JSON request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    /// Optional route category supplied by the discovery collaborator.
    /// When absent, the attribution engine derives a bucket from the path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl EndpointDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            phase: String::new(),
            requires_auth: false,
            body: None,
            category: None,
        }
    }

    pub fn with_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

impl std::fmt::Display for EndpointDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Outcome taxonomy: the fixed, closed classification assigned to every
/// completed probe. There is no unclassified residual state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// HTTP 2xx.
    Success,
    /// 401/403 on an unauthenticated descriptor, or any 401/403 when no
    /// token was supplied. Expected skip, not a failure.
    AuthRequired,
    /// HTTP 404: route not mounted.
    NotFound,
    /// HTTP 400/422: input contract mismatch.
    ValidationError,
    /// HTTP 429: informational under load-test mode.
    RateLimited,
    /// HTTP 5xx: critical failure.
    ServerError,
    /// No HTTP response received (timeout, reset, DNS).
    ConnectionError,
    /// Any other status: needs manual triage.
    Other,
}

impl Outcome {
    /// Every taxonomy code, in report order. Reports always carry a count
    /// for each code, even when zero.
    pub const ALL: [Outcome; 8] = [
        Outcome::Success,
        Outcome::AuthRequired,
        Outcome::NotFound,
        Outcome::ValidationError,
        Outcome::RateLimited,
        Outcome::ServerError,
        Outcome::ConnectionError,
        Outcome::Other,
    ];

    /// Classify an HTTP status for a descriptor.
    ///
    /// `token_supplied` reflects whether the run configuration carried an
    /// auth token. A rejected token on an auth-gated endpoint falls through
    /// to [`Outcome::Other`] rather than masquerading as an expected skip.
    pub fn classify(status: u16, requires_auth: bool, token_supplied: bool) -> Self {
        match status {
            200..=299 => Self::Success,
            401 | 403 if !requires_auth || !token_supplied => Self::AuthRequired,
            404 => Self::NotFound,
            400 | 422 => Self::ValidationError,
            429 => Self::RateLimited,
            500..=599 => Self::ServerError,
            _ => Self::Other,
        }
    }

    /// Whether this outcome counts as a failure for attribution and the
    /// early-abort guard.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::NotFound
                | Self::ValidationError
                | Self::ServerError
                | Self::ConnectionError
                | Self::Other
        )
    }

    /// Expected skip (auth-gated endpoint probed without credentials).
    pub fn is_skip(self) -> bool {
        matches!(self, Self::AuthRequired)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Self::Success => "SUCCESS",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::NotFound => "NOT_FOUND",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::RateLimited => "RATE_LIMITED",
            Self::ServerError => "SERVER_ERROR",
            Self::ConnectionError => "CONNECTION_ERROR",
            Self::Other => "OTHER",
        };
        write!(f, "{value}")
    }
}

/// The classified outcome of probing one endpoint descriptor.
///
/// Created exactly once per probe and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub method: Method,
    pub path: String,
    pub phase: String,
    pub outcome: Outcome,
    /// Absent when no HTTP response was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Per-phase tally of probe dispositions.
///
/// `passed` includes RATE_LIMITED results: throttling is informational and
/// must not be reported as a route failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub name: String,
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl PhaseSummary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Record one probe outcome into the tally.
    pub fn record(&mut self, outcome: Outcome) {
        self.total += 1;
        if outcome.is_failure() {
            self.failed += 1;
        } else if outcome.is_skip() {
            self.skipped += 1;
        } else {
            self.passed += 1;
        }
    }
}

/// One observation of the sweeper process's own memory use.
///
/// Produced only by the memory governor; the sample log is append-only and
/// single-writer for the duration of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MemorySample {
    pub timestamp: DateTime<Utc>,
    pub used_bytes: u64,
    pub budget_bytes: u64,
    /// Used fraction of the budget, 0-100.
    pub percent: f64,
}

impl MemorySample {
    pub fn new(timestamp: DateTime<Utc>, used_bytes: u64, budget_bytes: u64) -> Self {
        let percent = if budget_bytes == 0 {
            0.0
        } else {
            (used_bytes as f64 / budget_bytes as f64) * 100.0
        };
        Self {
            timestamp,
            used_bytes,
            budget_bytes,
            percent,
        }
    }
}

/// Record of one forced reclaim pass triggered by memory pressure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReclaimEvent {
    pub timestamp: DateTime<Utc>,
    pub before_bytes: u64,
    pub after_bytes: u64,
    pub reclaimed_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_roundtrip() {
        for (s, m) in [
            ("GET", Method::Get),
            ("POST", Method::Post),
            ("PUT", Method::Put),
            ("PATCH", Method::Patch),
            ("DELETE", Method::Delete),
        ] {
            assert_eq!(s.parse::<Method>().unwrap(), m);
            assert_eq!(m.to_string(), s);
        }
        assert!("OPTIONS".parse::<Method>().is_err());
    }

    #[test]
    fn classify_success_range() {
        assert_eq!(Outcome::classify(200, false, false), Outcome::Success);
        assert_eq!(Outcome::classify(201, false, false), Outcome::Success);
        assert_eq!(Outcome::classify(204, true, true), Outcome::Success);
    }

    #[test]
    fn classify_auth_without_token_is_skip() {
        // Auth-gated endpoint, no token configured: expected skip.
        assert_eq!(Outcome::classify(401, true, false), Outcome::AuthRequired);
        assert_eq!(Outcome::classify(403, true, false), Outcome::AuthRequired);
        // Endpoint not marked as auth-gated: still an expected skip.
        assert_eq!(Outcome::classify(401, false, true), Outcome::AuthRequired);
    }

    #[test]
    fn classify_rejected_token_needs_triage() {
        // Token was supplied and the endpoint expects auth, yet the service
        // rejected it. Not an expected skip.
        assert_eq!(Outcome::classify(401, true, true), Outcome::Other);
        assert_eq!(Outcome::classify(403, true, true), Outcome::Other);
    }

    #[test]
    fn classify_failure_codes() {
        assert_eq!(Outcome::classify(404, false, false), Outcome::NotFound);
        assert_eq!(
            Outcome::classify(400, false, false),
            Outcome::ValidationError
        );
        assert_eq!(
            Outcome::classify(422, false, false),
            Outcome::ValidationError
        );
        assert_eq!(Outcome::classify(429, false, false), Outcome::RateLimited);
        assert_eq!(Outcome::classify(500, false, false), Outcome::ServerError);
        assert_eq!(Outcome::classify(503, false, false), Outcome::ServerError);
        assert_eq!(Outcome::classify(301, false, false), Outcome::Other);
        assert_eq!(Outcome::classify(418, false, false), Outcome::Other);
    }

    #[test]
    fn failure_and_skip_partition() {
        for outcome in Outcome::ALL {
            // Each code is exactly one of: pass, skip, failure.
            let buckets =
                [outcome.is_failure(), outcome.is_skip(), !outcome.is_failure() && !outcome.is_skip()];
            assert_eq!(buckets.iter().filter(|b| **b).count(), 1, "{outcome}");
        }
        assert!(!Outcome::Success.is_failure());
        assert!(!Outcome::RateLimited.is_failure());
        assert!(Outcome::ConnectionError.is_failure());
    }

    #[test]
    fn phase_summary_dispositions() {
        let mut summary = PhaseSummary::new("Core");
        summary.record(Outcome::Success);
        summary.record(Outcome::RateLimited);
        summary.record(Outcome::AuthRequired);
        summary.record(Outcome::NotFound);
        summary.record(Outcome::ServerError);

        assert_eq!(summary.total, 5);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.total, summary.passed + summary.failed + summary.skipped);
    }

    #[test]
    fn memory_sample_percent() {
        let sample = MemorySample::new(Utc::now(), 800, 1000);
        assert!((sample.percent - 80.0).abs() < f64::EPSILON);

        // Zero budget must not divide by zero.
        let sample = MemorySample::new(Utc::now(), 800, 0);
        assert_eq!(sample.percent, 0.0);
    }

    #[test]
    fn outcome_serializes_screaming_snake() {
        let json = serde_json::to_string(&Outcome::ConnectionError).unwrap();
        assert_eq!(json, "\"CONNECTION_ERROR\"");
        let back: Outcome = serde_json::from_str("\"AUTH_REQUIRED\"").unwrap();
        assert_eq!(back, Outcome::AuthRequired);
    }
}
