//! Process memory collection from /proc.
//!
//! Reads the sweeper's own resident set size from /proc/self/status and the
//! machine's total memory from /proc/meminfo. The sweep paces itself against
//! its own footprint, not system-wide pressure, so RSS is the signal.

use thiserror::Error;
use tracing::debug;

/// Errors that can occur during memory collection.
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: &'static str,
        source: std::io::Error,
    },

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("failed to parse value for field '{field}': {value}")]
    Parse { field: &'static str, value: String },
}

/// A point-in-time view of the process's memory against its budget.
///
/// All values are in bytes. The budget defaults to total machine memory
/// when the caller does not supply an explicit one.
#[derive(Debug, Clone, Copy)]
pub struct ProcessMemory {
    /// Resident set size of this process.
    pub rss_bytes: u64,
    /// The budget the sweep paces itself against.
    pub budget_bytes: u64,
}

impl ProcessMemory {
    /// Collect current process memory from /proc, using total machine
    /// memory as the budget.
    pub fn read_from_proc() -> Result<Self, MemoryError> {
        Self::read_with_budget(None)
    }

    /// Collect current process memory, with an optional explicit budget.
    pub fn read_with_budget(budget_bytes: Option<u64>) -> Result<Self, MemoryError> {
        let status = std::fs::read_to_string("/proc/self/status").map_err(|source| {
            MemoryError::Read {
                path: "/proc/self/status",
                source,
            }
        })?;
        let rss_bytes = parse_vm_rss(&status)?;

        let budget_bytes = match budget_bytes {
            Some(b) => b,
            None => {
                let meminfo =
                    std::fs::read_to_string("/proc/meminfo").map_err(|source| MemoryError::Read {
                        path: "/proc/meminfo",
                        source,
                    })?;
                parse_mem_total(&meminfo)?
            }
        };

        debug!(rss_bytes, budget_bytes, "Process memory collected");

        Ok(Self {
            rss_bytes,
            budget_bytes,
        })
    }

    /// Used fraction of the budget, 0-100.
    pub fn percent(&self) -> f64 {
        if self.budget_bytes == 0 {
            return 0.0;
        }
        (self.rss_bytes as f64 / self.budget_bytes as f64) * 100.0
    }
}

/// Parse the VmRSS line out of /proc/self/status content.
///
/// Line format: `VmRSS:	   12345 kB`
pub fn parse_vm_rss(content: &str) -> Result<u64, MemoryError> {
    parse_kb_field(content, "VmRSS")
}

/// Parse the MemTotal line out of /proc/meminfo content.
pub fn parse_mem_total(content: &str) -> Result<u64, MemoryError> {
    parse_kb_field(content, "MemTotal")
}

fn parse_kb_field(content: &str, field: &'static str) -> Result<u64, MemoryError> {
    for line in content.lines() {
        if let Some((key, value)) = line.split_once(':')
            && key == field
        {
            let value_str = value.trim().trim_end_matches(" kB").trim();
            let kb = value_str.parse::<u64>().map_err(|_| MemoryError::Parse {
                field,
                value: value_str.to_string(),
            })?;
            return Ok(kb * 1024);
        }
    }
    Err(MemoryError::MissingField(field))
}
