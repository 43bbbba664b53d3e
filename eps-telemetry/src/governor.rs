//! Memory governor: periodic self-sampling with a pressure flag and
//! forced reclaim passes.
//!
//! The governor owns a background task that samples process memory on an
//! interval, appends each observation to a run-scoped log, and compares it
//! against the configured budget threshold. Crossing the threshold raises
//! an atomic pressure flag that the batch scheduler polls to widen its
//! pacing; dropping back below clears it. While the flag is raised, each
//! sample also drives a reclaim pass: the caller's reclaim hook runs when
//! one is installed, the process is re-sampled either way, and the
//! recovered bytes are recorded.

use crate::memory::{MemoryError, ProcessMemory};
use chrono::Utc;
use eps_common::{MemorySample, ReclaimEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

// =========================================================================
// Sampling seam
// =========================================================================

/// Source of memory observations. The production implementation reads
/// /proc; tests inject scripted sequences.
pub trait MemorySampler: Send + Sync + 'static {
    fn sample(&self) -> Result<ProcessMemory, MemoryError>;
}

/// Production sampler backed by /proc, with an optional explicit budget
/// overriding total machine memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcSampler {
    pub budget_bytes: Option<u64>,
}

impl MemorySampler for ProcSampler {
    fn sample(&self) -> Result<ProcessMemory, MemoryError> {
        ProcessMemory::read_with_budget(self.budget_bytes)
    }
}

// =========================================================================
// Configuration
// =========================================================================

/// Configuration for the memory governor.
#[derive(Clone)]
pub struct GovernorConfig {
    /// Pressure threshold as a percentage of the budget.
    pub threshold_percent: u8,
    /// Interval between samples.
    pub sample_interval: Duration,
    /// Optional hook run during a reclaim pass, before re-sampling.
    /// Typically drops caches or shrinks pooled buffers.
    pub reclaim_hook: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            threshold_percent: 80,
            sample_interval: Duration::from_secs(1),
            reclaim_hook: None,
        }
    }
}

impl std::fmt::Debug for GovernorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernorConfig")
            .field("threshold_percent", &self.threshold_percent)
            .field("sample_interval", &self.sample_interval)
            .field("reclaim_hook", &self.reclaim_hook.is_some())
            .finish()
    }
}

// =========================================================================
// Governor
// =========================================================================

/// Spawns and owns the background sampling task.
pub struct MemoryGovernor;

impl MemoryGovernor {
    /// Start the governor. Sampling begins immediately and continues until
    /// the handle is shut down.
    pub fn spawn(sampler: Arc<dyn MemorySampler>, config: GovernorConfig) -> GovernorHandle {
        let pressure = Arc::new(AtomicBool::new(false));
        let samples = Arc::new(Mutex::new(Vec::new()));
        let reclaims = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = {
            let pressure = Arc::clone(&pressure);
            let samples = Arc::clone(&samples);
            let reclaims = Arc::clone(&reclaims);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(config.sample_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => break,
                        _ = ticker.tick() => {
                            Self::observe(&*sampler, &config, &pressure, &samples, &reclaims);
                        }
                    }
                }

                debug!("Memory governor stopped");
            })
        };

        GovernorHandle {
            pressure,
            samples,
            reclaims,
            shutdown_tx,
            task,
        }
    }

    fn observe(
        sampler: &dyn MemorySampler,
        config: &GovernorConfig,
        pressure: &AtomicBool,
        samples: &Mutex<Vec<MemorySample>>,
        reclaims: &Mutex<Vec<ReclaimEvent>>,
    ) {
        let mem = match sampler.sample() {
            Ok(mem) => mem,
            Err(e) => {
                warn!(error = %e, "Memory sample failed");
                return;
            }
        };

        let sample = MemorySample::new(Utc::now(), mem.rss_bytes, mem.budget_bytes);
        if let Ok(mut log) = samples.lock() {
            log.push(sample);
        }

        if sample.percent >= config.threshold_percent as f64 {
            if !pressure.swap(true, Ordering::SeqCst) {
                warn!(
                    used_bytes = sample.used_bytes,
                    budget_bytes = sample.budget_bytes,
                    percent = format!("{:.1}", sample.percent),
                    threshold = config.threshold_percent,
                    "Memory pressure raised"
                );
            }

            // Every pressured sample drives a reclaim pass, hook or not:
            // the re-sample records how much the pass actually recovered.
            if let Some(hook) = &config.reclaim_hook {
                hook();
            }
            match sampler.sample() {
                Ok(after) => {
                    let event = ReclaimEvent {
                        timestamp: Utc::now(),
                        before_bytes: mem.rss_bytes,
                        after_bytes: after.rss_bytes,
                        reclaimed_bytes: mem.rss_bytes.saturating_sub(after.rss_bytes),
                    };
                    info!(
                        before_bytes = event.before_bytes,
                        after_bytes = event.after_bytes,
                        reclaimed_bytes = event.reclaimed_bytes,
                        "Reclaim pass completed"
                    );
                    if let Ok(mut log) = reclaims.lock() {
                        log.push(event);
                    }
                }
                Err(e) => warn!(error = %e, "Post-reclaim sample failed"),
            }
        } else if pressure.swap(false, Ordering::SeqCst) {
            info!(
                percent = format!("{:.1}", sample.percent),
                "Memory pressure cleared"
            );
        }
    }
}

/// Handle to a running governor. Shared with the batch scheduler, which
/// polls the pressure flag between batches.
pub struct GovernorHandle {
    pressure: Arc<AtomicBool>,
    samples: Arc<Mutex<Vec<MemorySample>>>,
    reclaims: Arc<Mutex<Vec<ReclaimEvent>>>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl GovernorHandle {
    /// Whether the most recent sample was at or above the threshold.
    pub fn under_pressure(&self) -> bool {
        self.pressure.load(Ordering::SeqCst)
    }

    /// Shared handle to the raw pressure flag, for callers that poll it
    /// after this handle has been consumed by shutdown.
    pub fn pressure_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.pressure)
    }

    /// Snapshot of the sample log so far, in observation order.
    pub fn samples(&self) -> Vec<MemorySample> {
        self.samples.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Snapshot of reclaim passes recorded so far.
    pub fn reclaim_events(&self) -> Vec<ReclaimEvent> {
        self.reclaims.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Stop sampling and wait for the task to exit. The sample and reclaim
    /// logs remain readable afterwards.
    pub async fn shutdown(self) -> (Vec<MemorySample>, Vec<ReclaimEvent>) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
        let samples = self.samples.lock().map(|s| s.clone()).unwrap_or_default();
        let reclaims = self.reclaims.lock().map(|r| r.clone()).unwrap_or_default();
        (samples, reclaims)
    }
}
