//! Bounded-concurrency batch scheduler with pressure-adaptive pacing.
//!
//! A phase's endpoints are cut into batches; each batch is dispatched
//! through a semaphore holding the concurrency ceiling and drained fully
//! before the next batch starts. Between batches the scheduler polls the
//! memory governor's pressure flag and widens the inter-batch delay by a
//! linear step while pressure holds, narrowing again once it clears.

use crate::executor::ProbeExecutor;
use eps_common::{EndpointDescriptor, ProbeResult, RunConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Polled between batches; true while the process is over its memory
/// threshold.
pub type PressureSignal = Arc<dyn Fn() -> bool + Send + Sync>;

/// Result of scheduling one phase.
pub struct PhaseRun {
    pub results: Vec<ProbeResult>,
    /// True when cancellation stopped the phase before every probe was
    /// issued. In-flight probes are always drained first.
    pub cancelled: bool,
}

pub struct BatchScheduler {
    executor: Arc<ProbeExecutor>,
    batch_size: usize,
    max_concurrent: usize,
    base_delay: Duration,
    max_delay_multiplier: f64,
    pressure: PressureSignal,
    /// Current inter-batch delay multiplier. Persists across phases so a
    /// sweep that tripped pressure early stays cautious until it clears.
    multiplier: Mutex<f64>,
}

impl BatchScheduler {
    pub fn new(executor: Arc<ProbeExecutor>, config: &RunConfig, pressure: PressureSignal) -> Self {
        Self {
            executor,
            batch_size: config.batch_size,
            max_concurrent: config.max_concurrent,
            base_delay: config.inter_batch_delay(),
            max_delay_multiplier: config.max_delay_multiplier,
            pressure,
            multiplier: Mutex::new(1.0),
        }
    }

    /// Run one phase's endpoints through batched, bounded dispatch.
    ///
    /// Results come back in catalog order regardless of completion order.
    pub async fn run_phase(
        &self,
        endpoints: &[EndpointDescriptor],
        cancel: &watch::Receiver<bool>,
    ) -> PhaseRun {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut results = Vec::with_capacity(endpoints.len());

        let batches: Vec<&[EndpointDescriptor]> = endpoints.chunks(self.batch_size).collect();
        let batch_count = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            if *cancel.borrow() {
                debug!(
                    completed_batches = index,
                    total_batches = batch_count,
                    "Phase cancelled between batches"
                );
                return PhaseRun {
                    results,
                    cancelled: true,
                };
            }

            results.extend(self.run_batch(batch, &semaphore, cancel).await);

            debug!(
                batch = index + 1,
                total_batches = batch_count,
                results = results.len(),
                "Batch drained"
            );

            if *cancel.borrow() {
                debug!(
                    completed_batches = index + 1,
                    total_batches = batch_count,
                    "Phase cancelled mid-batch"
                );
                return PhaseRun {
                    results,
                    cancelled: true,
                };
            }

            if index + 1 < batch_count {
                tokio::time::sleep(self.next_delay()).await;
            }
        }

        PhaseRun {
            results,
            cancelled: false,
        }
    }

    /// Dispatch one batch and wait for every probe in it to finish.
    ///
    /// Each task re-checks the cancel signal once it holds a permit, so
    /// probes still queued behind the semaphore when cancellation lands
    /// are never issued. Probes already in flight drain normally.
    async fn run_batch(
        &self,
        batch: &[EndpointDescriptor],
        semaphore: &Arc<Semaphore>,
        cancel: &watch::Receiver<bool>,
    ) -> Vec<ProbeResult> {
        let mut tasks = JoinSet::new();
        for (slot, endpoint) in batch.iter().cloned().enumerate() {
            let semaphore = Arc::clone(semaphore);
            let executor = Arc::clone(&self.executor);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                // The semaphore lives for the whole phase and is never
                // closed, so acquisition cannot fail in practice.
                let _permit = semaphore.acquire_owned().await.ok();
                if *cancel.borrow() {
                    return (slot, None);
                }
                (slot, Some(executor.probe(&endpoint).await))
            });
        }

        let mut slots: Vec<Option<ProbeResult>> = vec![None; batch.len()];
        while let Some(joined) = tasks.join_next().await {
            if let Ok((slot, result)) = joined {
                slots[slot] = result;
            }
        }
        slots.into_iter().flatten().collect()
    }

    /// Compute the next inter-batch delay, stepping the multiplier up
    /// under pressure and back down once it clears.
    fn next_delay(&self) -> Duration {
        let mut multiplier = match self.multiplier.lock() {
            Ok(m) => m,
            Err(poisoned) => poisoned.into_inner(),
        };

        if (self.pressure)() {
            *multiplier = (*multiplier + 1.0).min(self.max_delay_multiplier);
            warn!(
                multiplier = *multiplier,
                base_ms = self.base_delay.as_millis() as u64,
                "Memory pressure widening inter-batch delay"
            );
        } else if *multiplier > 1.0 {
            *multiplier = (*multiplier - 1.0).max(1.0);
            debug!(multiplier = *multiplier, "Inter-batch delay narrowing");
        }

        self.base_delay.mul_f64(*multiplier)
    }

    /// Current delay multiplier, for run diagnostics.
    pub fn delay_multiplier(&self) -> f64 {
        match self.multiplier.lock() {
            Ok(m) => *m,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
