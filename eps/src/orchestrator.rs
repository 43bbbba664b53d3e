//! Sweep orchestration: phases in catalog order, settle windows, the
//! failure-rate guard, and report assembly.
//!
//! The orchestrator owns the run lifecycle. Phases execute strictly
//! sequentially; within a phase the batch scheduler handles dispatch.
//! Cancellation is observed at batch and phase boundaries only, so
//! in-flight probes always drain and every completed result is kept.

use crate::attribution;
use crate::batch::{BatchScheduler, PressureSignal};
use crate::executor::ProbeExecutor;
use crate::ratelimit;
use crate::transport::Transport;
use chrono::Utc;
use eps_common::{Catalog, PhaseSummary, ProbeResult, RunConfig, RunReport, RunTotals};
use eps_telemetry::GovernorHandle;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

/// Optional rate-limit probe settings for a run.
#[derive(Debug, Clone)]
pub struct RateLimitTarget {
    pub path: String,
    pub iterations: u32,
}

pub struct Orchestrator {
    config: RunConfig,
    transport: Arc<dyn Transport>,
}

impl Orchestrator {
    pub fn new(config: RunConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// Execute a full sweep over the catalog and assemble the report.
    ///
    /// The governor, when supplied, is shut down at the end of the run and
    /// its sample and reclaim logs are folded into the report.
    pub async fn run(
        &self,
        catalog: &Catalog,
        governor: Option<GovernorHandle>,
        cancel: watch::Receiver<bool>,
        rate_limit: Option<RateLimitTarget>,
    ) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        info!(
            %run_id,
            base_url = %self.config.base_url,
            phases = catalog.phases().len(),
            endpoints = catalog.endpoint_count(),
            "Sweep starting"
        );

        let executor = Arc::new(ProbeExecutor::new(
            Arc::clone(&self.transport),
            self.config.base_url.clone(),
            self.config.auth_token.clone(),
        ));

        let pressure: PressureSignal = match &governor {
            Some(handle) => {
                let flag = handle.pressure_flag();
                Arc::new(move || flag.load(std::sync::atomic::Ordering::SeqCst))
            }
            None => Arc::new(|| false),
        };
        let scheduler = BatchScheduler::new(Arc::clone(&executor), &self.config, pressure);

        let mut totals = RunTotals::default();
        let mut phases: Vec<PhaseSummary> = Vec::new();
        let mut all_results: Vec<ProbeResult> = Vec::new();
        let mut run_aborted = false;
        let mut abort_reason: Option<String> = None;

        let phase_count = catalog.phases().len();
        for (index, phase) in catalog.phases().iter().enumerate() {
            if *cancel.borrow() {
                run_aborted = true;
                abort_reason = Some("cancelled".to_string());
                break;
            }

            info!(
                phase = %phase.name,
                endpoints = phase.endpoints.len(),
                "Phase starting"
            );

            let phase_run = scheduler.run_phase(&phase.endpoints, &cancel).await;

            let mut summary = PhaseSummary::new(phase.name.clone());
            for result in &phase_run.results {
                summary.record(result.outcome);
                totals.record(result.outcome);
            }
            all_results.extend(phase_run.results);

            info!(
                phase = %phase.name,
                passed = summary.passed,
                failed = summary.failed,
                skipped = summary.skipped,
                "Phase completed"
            );
            phases.push(summary);

            if phase_run.cancelled {
                run_aborted = true;
                abort_reason = Some("cancelled".to_string());
                break;
            }

            // Guard against a globally-down target: keep aborting cheap
            // instead of grinding through every remaining phase.
            let failure_rate = totals.failure_rate();
            if failure_rate > self.config.failure_rate_ceiling {
                warn!(
                    failure_rate = format!("{failure_rate:.2}"),
                    ceiling = self.config.failure_rate_ceiling,
                    "Failure rate exceeded ceiling; aborting sweep"
                );
                run_aborted = true;
                abort_reason = Some(format!(
                    "failure rate {failure_rate:.2} exceeded ceiling {:.2}",
                    self.config.failure_rate_ceiling
                ));
                break;
            }

            // Settle window: lets the governor observe steady-state memory
            // before the next phase's allocations begin.
            tokio::time::sleep(self.config.settle_delay()).await;
            if index + 1 < phase_count {
                tokio::time::sleep(self.config.inter_phase_delay()).await;
            }
        }

        let rate_limit_finding = match (&rate_limit, run_aborted) {
            (Some(target), false) => {
                Some(
                    ratelimit::probe_rate_limit(
                        &executor,
                        &target.path,
                        target.iterations,
                        &cancel,
                    )
                    .await,
                )
            }
            _ => None,
        };

        let category_overrides: HashMap<String, String> = catalog
            .phases()
            .iter()
            .flat_map(|p| p.endpoints.iter())
            .filter_map(|e| e.category.clone().map(|c| (e.path.clone(), c)))
            .collect();

        let route_buckets = attribution::build_buckets(&all_results, &category_overrides);
        let recommendations = attribution::build_recommendations(&route_buckets);

        let (memory_samples, reclaim_events) = match governor {
            Some(handle) => handle.shutdown().await,
            None => (Vec::new(), Vec::new()),
        };

        let report = RunReport {
            run_id,
            base_url: self.config.base_url.clone(),
            started_at,
            ended_at: Utc::now(),
            run_aborted,
            abort_reason,
            totals,
            phases,
            route_buckets,
            recommendations,
            memory_samples,
            reclaim_events,
            rate_limit: rate_limit_finding,
        };

        info!(
            %run_id,
            total = report.totals.total,
            passed = report.totals.passed,
            failed = report.totals.failed,
            skipped = report.totals.skipped,
            aborted = report.run_aborted,
            recommendations = report.recommendations.len(),
            "Sweep finished"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockBehavior, MockTransport};
    use eps_common::{EndpointDescriptor, Method, Outcome, Phase, Priority};
    use std::time::Duration;

    fn fast_config() -> RunConfig {
        RunConfig {
            base_url: "http://test".to_string(),
            max_concurrent: 2,
            batch_size: 3,
            inter_batch_delay_ms: 1,
            inter_phase_delay_ms: 1,
            settle_delay_ms: 1,
            ..Default::default()
        }
    }

    fn catalog() -> Catalog {
        Catalog::new(vec![
            Phase::new(
                "Core",
                vec![
                    EndpointDescriptor::new(Method::Get, "/health"),
                    EndpointDescriptor::new(Method::Get, "/widgets/:id"),
                ],
            ),
            Phase::new(
                "Mutations",
                vec![EndpointDescriptor::new(Method::Post, "/widgets")],
            ),
        ])
        .unwrap()
    }

    fn mock() -> MockTransport {
        MockTransport::new()
            .route(Method::Get, "/widgets/:id", MockBehavior::Status(404))
            .route(Method::Post, "/widgets", MockBehavior::Status(500))
            .latency(Duration::from_millis(2))
    }

    #[tokio::test]
    async fn full_sweep_builds_attributed_report() {
        let orchestrator = Orchestrator::new(fast_config(), mock().into_shared());
        let (_, cancel) = watch::channel(false);

        let report = orchestrator.run(&catalog(), None, cancel, None).await;

        assert!(!report.run_aborted);
        assert!(report.abort_reason.is_none());
        assert_eq!(report.totals.total, 3);
        assert_eq!(report.totals.passed, 1);
        assert_eq!(report.totals.failed, 2);
        assert_eq!(report.totals.counts.get(Outcome::Success), 1);
        assert_eq!(report.totals.counts.get(Outcome::NotFound), 1);
        assert_eq!(report.totals.counts.get(Outcome::ServerError), 1);

        assert_eq!(report.phases.len(), 2);
        assert_eq!(report.phases[0].name, "Core");
        assert_eq!(report.phases[1].failed, 1);

        // Both failures land in the widgets bucket, ranked first.
        assert_eq!(report.route_buckets[0].route, "widgets");
        assert_eq!(report.route_buckets[0].failures, 2);

        let priorities: Vec<Priority> =
            report.recommendations.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![Priority::Critical, Priority::High]);
        assert!(report.ended_at >= report.started_at);
    }

    #[tokio::test]
    async fn failure_ceiling_aborts_between_phases() {
        let transport = MockTransport::new()
            .fallback(MockBehavior::ConnectError)
            .latency(Duration::ZERO)
            .into_shared();
        let config = RunConfig {
            failure_rate_ceiling: 0.5,
            ..fast_config()
        };
        let orchestrator = Orchestrator::new(config, transport);
        let (_, cancel) = watch::channel(false);

        let report = orchestrator.run(&catalog(), None, cancel, None).await;

        assert!(report.run_aborted);
        assert!(
            report
                .abort_reason
                .as_deref()
                .is_some_and(|r| r.contains("failure rate"))
        );
        // Second phase never ran.
        assert_eq!(report.phases.len(), 1);
        assert_eq!(report.totals.total, 2);
    }

    #[tokio::test]
    async fn cancellation_keeps_completed_results() {
        let orchestrator = Orchestrator::new(fast_config(), mock().into_shared());
        let (tx, cancel) = watch::channel(true);

        let report = orchestrator.run(&catalog(), None, cancel, None).await;
        drop(tx);

        assert!(report.run_aborted);
        assert_eq!(report.abort_reason.as_deref(), Some("cancelled"));
        assert_eq!(report.totals.total, 0);
        assert!(report.phases.is_empty());
    }

    #[tokio::test]
    async fn rate_limit_probe_runs_after_phases() {
        let transport = mock()
            .route(Method::Get, "/health", MockBehavior::RateLimitAfter(4))
            .into_shared();
        let orchestrator = Orchestrator::new(fast_config(), transport);
        let (_, cancel) = watch::channel(false);

        let target = RateLimitTarget {
            path: "/health".to_string(),
            iterations: 25,
        };
        let report = orchestrator
            .run(&catalog(), None, cancel, Some(target))
            .await;

        let finding = report.rate_limit.expect("finding should be present");
        // The catalog sweep already hit /health once, so the sequential
        // probe sees the 429 on its third call.
        assert_eq!(finding.trigger_index, Some(3));
    }

    #[tokio::test]
    async fn rate_limit_probe_skipped_on_abort() {
        let transport = MockTransport::new()
            .fallback(MockBehavior::ConnectError)
            .latency(Duration::ZERO)
            .into_shared();
        let config = RunConfig {
            failure_rate_ceiling: 0.1,
            ..fast_config()
        };
        let orchestrator = Orchestrator::new(config, transport);
        let (_, cancel) = watch::channel(false);

        let target = RateLimitTarget {
            path: "/health".to_string(),
            iterations: 25,
        };
        let report = orchestrator
            .run(&catalog(), None, cancel, Some(target))
            .await;

        assert!(report.run_aborted);
        assert!(report.rate_limit.is_none());
    }

    #[tokio::test]
    async fn auth_gated_endpoints_count_as_skips() {
        let transport = MockTransport::new()
            .route(Method::Get, "/api/v1/me", MockBehavior::Status(401))
            .latency(Duration::ZERO)
            .into_shared();
        let catalog = Catalog::new(vec![Phase::new(
            "Protected",
            vec![EndpointDescriptor::new(Method::Get, "/api/v1/me").with_auth()],
        )])
        .unwrap();
        let orchestrator = Orchestrator::new(fast_config(), transport);
        let (_, cancel) = watch::channel(false);

        let report = orchestrator.run(&catalog, None, cancel, None).await;

        assert_eq!(report.totals.skipped, 1);
        assert_eq!(report.totals.failed, 0);
        assert!(report.recommendations.is_empty());
    }

    #[tokio::test]
    async fn category_override_names_the_bucket() {
        let transport = MockTransport::new()
            .route(Method::Get, "/internal/xyz", MockBehavior::Status(500))
            .latency(Duration::ZERO)
            .into_shared();
        let mut endpoint = EndpointDescriptor::new(Method::Get, "/internal/xyz");
        endpoint.category = Some("billing".to_string());
        let catalog = Catalog::new(vec![Phase::new("Internal", vec![endpoint])]).unwrap();
        let orchestrator = Orchestrator::new(fast_config(), transport);
        let (_, cancel) = watch::channel(false);

        let report = orchestrator.run(&catalog, None, cancel, None).await;

        assert_eq!(report.route_buckets[0].route, "billing");
        assert_eq!(report.recommendations[0].routes, vec!["billing".to_string()]);
    }
}
