//! Sequential rate-limit probe.
//!
//! Re-issues one endpoint back to back, without batching or delays, until
//! the service answers 429 or the iteration cap is reached. Runs after the
//! catalog sweep so its burst cannot skew phase results.

use crate::executor::ProbeExecutor;
use eps_common::{EndpointDescriptor, Method, Outcome, RateLimitFinding};
use tokio::sync::watch;
use tracing::{debug, info};

/// Probe `path` up to `iterations` times, reporting the 1-indexed request
/// at which throttling first appeared, or None when it never did.
pub async fn probe_rate_limit(
    executor: &ProbeExecutor,
    path: &str,
    iterations: u32,
    cancel: &watch::Receiver<bool>,
) -> RateLimitFinding {
    let endpoint = EndpointDescriptor::new(Method::Get, path);
    let mut trigger_index = None;

    for iteration in 1..=iterations {
        if *cancel.borrow() {
            debug!(iteration, "Rate-limit probe cancelled");
            break;
        }

        let result = executor.probe(&endpoint).await;
        if result.outcome == Outcome::RateLimited {
            trigger_index = Some(iteration);
            break;
        }
    }

    match trigger_index {
        Some(index) => info!(
            path,
            trigger_index = index,
            "Rate limiting enforced"
        ),
        None => info!(path, iterations, "No rate limiting observed within cap"),
    }

    RateLimitFinding {
        path: path.to_string(),
        iterations,
        trigger_index,
    }
}
