//! Serializable run report: totals, per-phase summaries, route buckets,
//! remediation recommendations, and governor telemetry.
//!
//! This module is the data model only. The attribution engine that fills
//! the buckets and recommendations lives with the sweep orchestration.

use crate::types::{MemorySample, Outcome, PhaseSummary, ProbeResult, ReclaimEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Counts per taxonomy code. Every code is always present, even at zero,
/// so report consumers never need to special-case missing keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutcomeCounts {
    counts: BTreeMap<Outcome, u64>,
}

impl Default for OutcomeCounts {
    fn default() -> Self {
        let mut counts = BTreeMap::new();
        for outcome in Outcome::ALL {
            counts.insert(outcome, 0);
        }
        Self { counts }
    }
}

impl OutcomeCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: Outcome) {
        *self.counts.entry(outcome).or_insert(0) += 1;
    }

    pub fn get(&self, outcome: Outcome) -> u64 {
        self.counts.get(&outcome).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Sum of counts for failure-class outcomes.
    pub fn failures(&self) -> u64 {
        Outcome::ALL
            .iter()
            .filter(|o| o.is_failure())
            .map(|o| self.get(*o))
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Outcome, u64)> + '_ {
        self.counts.iter().map(|(o, c)| (*o, *c))
    }
}

/// Remediation priority assigned to a recommendation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Map a failure-class outcome to its remediation priority.
    ///
    /// Server errors outrank everything: the route exists but is broken.
    /// Missing routes and dead connections block consumers outright.
    /// Contract mismatches are fixable client-side. Everything else needs
    /// a human to look first.
    pub fn for_outcome(outcome: Outcome) -> Option<Self> {
        match outcome {
            Outcome::ServerError => Some(Self::Critical),
            Outcome::NotFound | Outcome::ConnectionError => Some(Self::High),
            Outcome::ValidationError => Some(Self::Medium),
            Outcome::Other => Some(Self::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        };
        write!(f, "{value}")
    }
}

/// Aggregated failure data for one route bucket (first meaningful path
/// segment, or the descriptor's category when supplied).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteBucket {
    pub route: String,
    pub probes: u64,
    pub failures: u64,
    pub counts: OutcomeCounts,
    pub mean_latency_ms: f64,
    /// Up to ten illustrative failing probes for this bucket.
    pub samples: Vec<ProbeResult>,
}

/// One actionable remediation item: a failure class with the route
/// buckets it appeared in and concrete endpoints to start from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub outcome: Outcome,
    /// Total occurrences of this class across the listed routes.
    pub count: u64,
    /// Affected route buckets, in bucket rank order.
    pub routes: Vec<String>,
    /// Up to ten "METHOD /path" samples drawn from the buckets.
    pub sample_endpoints: Vec<String>,
    pub guidance: String,
}

/// Result of the sequential rate-limit probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitFinding {
    pub path: String,
    pub iterations: u32,
    /// 1-indexed request number at which the first 429 appeared, or None
    /// when the cap was reached without throttling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_index: Option<u32>,
}

impl RateLimitFinding {
    pub fn enforced(&self) -> bool {
        self.trigger_index.is_some()
    }
}

/// Run-wide disposition totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunTotals {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub counts: OutcomeCounts,
}

impl RunTotals {
    pub fn record(&mut self, outcome: Outcome) {
        self.total += 1;
        if outcome.is_failure() {
            self.failed += 1;
        } else if outcome.is_skip() {
            self.skipped += 1;
        } else {
            self.passed += 1;
        }
        self.counts.record(outcome);
    }

    /// Failure rate over all recorded probes, 0.0 when none have run.
    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }
}

/// The complete serializable output of one sweep run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub base_url: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// True when the run stopped before exhausting the catalog, whether by
    /// cancellation or the failure-rate guard.
    pub run_aborted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub totals: RunTotals,
    pub phases: Vec<PhaseSummary>,
    /// Route buckets ranked by failure count, descending.
    pub route_buckets: Vec<RouteBucket>,
    /// Remediation items ordered by priority.
    pub recommendations: Vec<Recommendation>,
    pub memory_samples: Vec<MemorySample>,
    pub reclaim_events: Vec<ReclaimEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitFinding>,
}

impl RunReport {
    /// Whether the report carries any CRITICAL recommendations. Used by the
    /// CLI to choose its exit code.
    pub fn has_critical(&self) -> bool {
        self.recommendations
            .iter()
            .any(|r| r.priority == Priority::Critical)
    }
}
