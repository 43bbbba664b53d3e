//! Shared types for the Endpoint Probe Sweeper.
//!
//! This crate holds the data model that crosses component boundaries:
//! endpoint descriptors and phases, the outcome taxonomy, probe results,
//! run configuration, and the serializable run report. It contains no
//! network or scheduling logic.

pub mod catalog;
pub mod config;
pub mod report;
pub mod types;

pub use catalog::{Catalog, CatalogError, Phase};
pub use config::{ConfigError, ConfigWarning, RunConfig};
pub use report::{
    OutcomeCounts, Priority, RateLimitFinding, Recommendation, RouteBucket, RunReport, RunTotals,
};
pub use types::{
    EndpointDescriptor, MemorySample, Method, Outcome, PhaseSummary, ProbeResult, ReclaimEvent,
};
