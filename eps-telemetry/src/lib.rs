//! Memory telemetry for the Endpoint Probe Sweeper.
//!
//! Two pieces: raw collection of the sweeper process's own memory use from
//! /proc, and the governor that samples it on an interval, raises a
//! pressure flag against a configured budget threshold, and runs reclaim
//! passes when the flag trips.

pub mod governor;
pub mod memory;

pub use governor::{GovernorConfig, GovernorHandle, MemoryGovernor, MemorySampler, ProcSampler};
pub use memory::{MemoryError, ProcessMemory};
