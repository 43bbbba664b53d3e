//! Endpoint Probe Sweeper engine.
//!
//! Sweeps an HTTP endpoint catalog phase by phase in bounded concurrent
//! batches, classifies every probe into a fixed outcome taxonomy, paces
//! itself against its own memory footprint, and distills the failures into
//! a route-bucketed remediation report.

pub mod attribution;
pub mod batch;
pub mod executor;
pub mod orchestrator;
pub mod ratelimit;
pub mod sink;
pub mod transport;
