//! Run configuration: defaults, TOML file loading, and startup validation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating run configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Warning-level finding from configuration validation. The run proceeds;
/// the caller decides whether to surface these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Complete configuration for one sweep run.
///
/// Each run owns its own config; nothing here is global, so independent
/// runs can execute concurrently without interference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Base URL of the target service, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Concurrency ceiling for probes within a batch.
    pub max_concurrent: usize,
    /// Maximum endpoints per batch.
    pub batch_size: usize,
    /// Baseline delay between batches.
    pub inter_batch_delay_ms: u64,
    /// Delay between phases.
    pub inter_phase_delay_ms: u64,
    /// Memory pressure threshold as a percentage of the heap budget.
    pub memory_threshold_percent: u8,
    /// Timeout applied to each individual probe.
    pub per_request_timeout_ms: u64,
    /// Optional bearer token attached to every probe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Abort the run early when the failure rate across completed phases
    /// exceeds this fraction (guard against probing a service that is
    /// globally down).
    pub failure_rate_ceiling: f64,
    /// Settling window after each phase for the memory governor to report
    /// steady-state memory.
    pub settle_delay_ms: u64,
    /// Cap on the pressure-driven inter-batch delay multiplier.
    pub max_delay_multiplier: f64,
    /// Iteration cap for the rate-limit probe.
    pub rate_limit_iterations: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            max_concurrent: 4,
            batch_size: 20,
            inter_batch_delay_ms: 400,
            inter_phase_delay_ms: 2000,
            memory_threshold_percent: 80,
            per_request_timeout_ms: 8000,
            auth_token: None,
            failure_rate_ceiling: 0.9,
            settle_delay_ms: 1500,
            max_delay_multiplier: 4.0,
            rate_limit_iterations: 25,
        }
    }
}

impl RunConfig {
    /// Load configuration from a TOML file, filling unspecified fields with
    /// defaults, then validating.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate_hard()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate_hard(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".into()));
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent must be at least 1".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.failure_rate_ceiling) {
            return Err(ConfigError::Invalid(
                "failure_rate_ceiling must be within [0.0, 1.0]".into(),
            ));
        }
        if self.max_delay_multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "max_delay_multiplier must be at least 1.0".into(),
            ));
        }
        Ok(())
    }

    /// Produce warning-level findings for values that are legal but likely
    /// unintended.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.memory_threshold_percent > 95 {
            warnings.push(ConfigWarning {
                field: "memory_threshold_percent",
                message: format!(
                    "{}% leaves almost no headroom before the process is at budget",
                    self.memory_threshold_percent
                ),
            });
        }
        if self.max_concurrent > 32 {
            warnings.push(ConfigWarning {
                field: "max_concurrent",
                message: format!(
                    "{} concurrent probes may itself look like a load test to the target",
                    self.max_concurrent
                ),
            });
        }
        if self.per_request_timeout_ms < 1000 {
            warnings.push(ConfigWarning {
                field: "per_request_timeout_ms",
                message: format!(
                    "{}ms will classify slow-but-healthy endpoints as CONNECTION_ERROR",
                    self.per_request_timeout_ms
                ),
            });
        }
        if self.inter_batch_delay_ms == 0 {
            warnings.push(ConfigWarning {
                field: "inter_batch_delay_ms",
                message: "0ms disables request-rate bounding between batches".to_string(),
            });
        }

        warnings
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    pub fn inter_phase_delay(&self) -> Duration {
        Duration::from_millis(self.inter_phase_delay_ms)
    }

    pub fn per_request_timeout(&self) -> Duration {
        Duration::from_millis(self.per_request_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
