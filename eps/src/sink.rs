//! Report sink: writes the finished run report to disk as pretty JSON.

use eps_common::RunReport;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialize the report and write it to `path`, replacing any existing
/// file.
pub fn write_report(report: &RunReport, path: &Path) -> Result<(), SinkError> {
    let json = serde_json::to_string_pretty(report)?;
    let bytes = json.len();
    std::fs::write(path, json)?;
    info!(path = %path.display(), bytes, "Report written");
    Ok(())
}
