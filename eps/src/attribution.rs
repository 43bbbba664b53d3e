//! Failure attribution: route bucketing and remediation recommendations.
//!
//! After the sweep, every result is folded into a route bucket derived
//! from its path (or the descriptor's category when the discovery
//! collaborator supplied one). Buckets are ranked by failure count and
//! each failing class present anywhere becomes one prioritized
//! remediation item naming the routes and sample endpoints it hit.

use eps_common::{Outcome, OutcomeCounts, Priority, ProbeResult, Recommendation, RouteBucket};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Derive the route bucket for a path: the first segment after a
/// `/api/vN` prefix, otherwise the first segment.
///
/// `/api/v1/widgets/5` -> `widgets`, `/health` -> `health`, `/` -> `root`.
pub fn route_bucket(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        [] => "root".to_string(),
        ["api", version, rest, ..] if is_version_segment(version) => (*rest).to_string(),
        ["api", version] if is_version_segment(version) => (*version).to_string(),
        [first, ..] => (*first).to_string(),
    }
}

fn is_version_segment(segment: &str) -> bool {
    segment.len() >= 2
        && segment.starts_with('v')
        && segment[1..].chars().all(|c| c.is_ascii_digit())
}

/// Fold results into route buckets, ranked by failure count descending.
///
/// Only routes with at least one failing probe become buckets; healthy
/// routes show up in the run totals but carry nothing to remediate.
/// `category_overrides` maps a path to the bucket its descriptor named
/// explicitly; everything else falls back to path derivation.
pub fn build_buckets(
    results: &[ProbeResult],
    category_overrides: &HashMap<String, String>,
) -> Vec<RouteBucket> {
    struct Accum {
        probes: u64,
        counts: OutcomeCounts,
        latency_sum: u64,
        samples: Vec<ProbeResult>,
    }

    // BTreeMap keeps equal-ranked buckets in a stable name order.
    let mut buckets: BTreeMap<String, Accum> = BTreeMap::new();

    for result in results {
        let route = category_overrides
            .get(&result.path)
            .cloned()
            .unwrap_or_else(|| route_bucket(&result.path));

        let accum = buckets.entry(route).or_insert_with(|| Accum {
            probes: 0,
            counts: OutcomeCounts::new(),
            latency_sum: 0,
            samples: Vec::new(),
        });
        accum.probes += 1;
        accum.counts.record(result.outcome);
        accum.latency_sum += result.latency_ms;
        if result.outcome.is_failure() && accum.samples.len() < 10 {
            accum.samples.push(result.clone());
        }
    }

    let mut out: Vec<RouteBucket> = buckets
        .into_iter()
        .filter(|(_, accum)| accum.counts.failures() > 0)
        .map(|(route, accum)| RouteBucket {
            route,
            probes: accum.probes,
            failures: accum.counts.failures(),
            mean_latency_ms: if accum.probes == 0 {
                0.0
            } else {
                accum.latency_sum as f64 / accum.probes as f64
            },
            counts: accum.counts,
            samples: accum.samples,
        })
        .collect();

    out.sort_by(|a, b| {
        b.failures
            .cmp(&a.failures)
            .then(b.probes.cmp(&a.probes))
            .then(a.route.cmp(&b.route))
    });

    debug!(buckets = out.len(), "Route buckets built");
    out
}

/// Distill buckets into prioritized remediation items: one per failing
/// class present anywhere, naming every affected route bucket and up to
/// ten concrete endpoints to start from, ordered by priority then count.
pub fn build_recommendations(buckets: &[RouteBucket]) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    for outcome in Outcome::ALL {
        let Some(priority) = Priority::for_outcome(outcome) else {
            continue;
        };

        let mut count = 0;
        let mut routes = Vec::new();
        let mut sample_endpoints = Vec::new();
        for bucket in buckets {
            let in_bucket = bucket.counts.get(outcome);
            if in_bucket == 0 {
                continue;
            }
            count += in_bucket;
            routes.push(bucket.route.clone());
            for sample in bucket.samples.iter().filter(|s| s.outcome == outcome) {
                if sample_endpoints.len() < 10 {
                    sample_endpoints.push(format!("{} {}", sample.method, sample.path));
                }
            }
        }
        if count == 0 {
            continue;
        }

        recommendations.push(Recommendation {
            priority,
            outcome,
            count,
            routes,
            sample_endpoints,
            guidance: guidance(outcome),
        });
    }

    recommendations.sort_by(|a, b| a.priority.cmp(&b.priority).then(b.count.cmp(&a.count)));
    recommendations
}

fn guidance(outcome: Outcome) -> String {
    match outcome {
        Outcome::ServerError => {
            "5xx: the routes exist but their handlers are broken. Inspect server logs for the failing requests."
        }
        Outcome::NotFound => {
            "404: routes not mounted. Check router registration and path spelling against the deployed service."
        }
        Outcome::ConnectionError => {
            "No HTTP response: check service availability, DNS, and the per-request timeout."
        }
        Outcome::ValidationError => {
            "400/422: request contract mismatch. Compare probe bodies against the handlers' expected schemas."
        }
        Outcome::Other => "Unexpected statuses outside the known taxonomy; needs manual triage.",
        // Non-failures never reach here; for_outcome filters them out.
        _ => "",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use eps_common::Method;
    use proptest::prelude::*;

    fn result(path: &str, status: u16, latency_ms: u64) -> ProbeResult {
        let outcome = Outcome::classify(status, false, false);
        ProbeResult {
            method: Method::Get,
            path: path.to_string(),
            phase: "Test".to_string(),
            outcome,
            http_status: Some(status),
            latency_ms,
            error_detail: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn bucket_derivation() {
        assert_eq!(route_bucket("/api/v1/widgets/5"), "widgets");
        assert_eq!(route_bucket("/api/v2/users"), "users");
        assert_eq!(route_bucket("/api/v12/orders/:id/items"), "orders");
        assert_eq!(route_bucket("/health"), "health");
        assert_eq!(route_bucket("/widgets/:id"), "widgets");
        assert_eq!(route_bucket("/"), "root");
        // "api" without a version segment is its own bucket.
        assert_eq!(route_bucket("/api/status"), "api");
        // "vX" that is not a version number does not trigger the prefix rule.
        assert_eq!(route_bucket("/api/vnext/users"), "api");
    }

    #[test]
    fn category_override_beats_derivation() {
        let results = vec![result("/internal/xyz", 500, 10)];
        let overrides =
            HashMap::from([("/internal/xyz".to_string(), "billing".to_string())]);

        let buckets = build_buckets(&results, &overrides);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].route, "billing");
    }

    #[test]
    fn buckets_rank_by_failures() {
        let results = vec![
            result("/health", 200, 5),
            result("/widgets/1", 404, 10),
            result("/widgets/2", 500, 20),
            result("/users/1", 404, 15),
        ];

        let buckets = build_buckets(&results, &HashMap::new());
        // Healthy routes never become buckets.
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].route, "widgets");
        assert_eq!(buckets[0].failures, 2);
        assert_eq!(buckets[1].route, "users");
        assert_eq!(buckets[1].failures, 1);
    }

    #[test]
    fn bucket_mean_latency_and_samples() {
        let results = vec![
            result("/widgets/1", 500, 10),
            result("/widgets/2", 500, 30),
            result("/widgets/3", 200, 20),
        ];

        let buckets = build_buckets(&results, &HashMap::new());
        let widgets = &buckets[0];
        assert_eq!(widgets.probes, 3);
        assert!((widgets.mean_latency_ms - 20.0).abs() < f64::EPSILON);
        // Only failing probes are kept as samples.
        assert_eq!(widgets.samples.len(), 2);
        assert!(widgets.samples.iter().all(|s| s.outcome.is_failure()));
    }

    #[test]
    fn samples_cap_at_ten() {
        let results: Vec<ProbeResult> = (0..15)
            .map(|i| result(&format!("/widgets/{i}"), 500, 10))
            .collect();

        let buckets = build_buckets(&results, &HashMap::new());
        assert_eq!(buckets[0].failures, 15);
        assert_eq!(buckets[0].samples.len(), 10);
    }

    #[test]
    fn recommendations_for_sweep_scenario() {
        // One healthy route, one route failing two different ways.
        let results = vec![
            result("/health", 200, 5),
            result("/widgets/:id", 404, 10),
            result("/widgets", 500, 20),
        ];

        let buckets = build_buckets(&results, &HashMap::new());
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].route, "widgets");
        assert_eq!(buckets[0].counts.get(Outcome::NotFound), 1);
        assert_eq!(buckets[0].counts.get(Outcome::ServerError), 1);

        let recommendations = build_recommendations(&buckets);

        assert_eq!(recommendations.len(), 2);
        assert_eq!(recommendations[0].priority, Priority::Critical);
        assert_eq!(recommendations[0].outcome, Outcome::ServerError);
        assert_eq!(recommendations[0].routes, vec!["widgets".to_string()]);
        assert_eq!(
            recommendations[0].sample_endpoints,
            vec!["GET /widgets".to_string()]
        );
        assert_eq!(recommendations[1].priority, Priority::High);
        assert_eq!(recommendations[1].outcome, Outcome::NotFound);
        assert_eq!(
            recommendations[1].sample_endpoints,
            vec!["GET /widgets/:id".to_string()]
        );
    }

    #[test]
    fn recommendations_aggregate_across_buckets() {
        // The same failure class on two routes folds into one item that
        // names both.
        let results = vec![
            result("/widgets/1", 404, 10),
            result("/users/1", 404, 15),
        ];

        let buckets = build_buckets(&results, &HashMap::new());
        let recommendations = build_recommendations(&buckets);

        assert_eq!(recommendations.len(), 1);
        let rec = &recommendations[0];
        assert_eq!(rec.outcome, Outcome::NotFound);
        assert_eq!(rec.count, 2);
        // Routes follow bucket rank order (equal failures: name order).
        assert_eq!(
            rec.routes,
            vec!["users".to_string(), "widgets".to_string()]
        );
        assert_eq!(rec.sample_endpoints.len(), 2);
    }

    #[test]
    fn recommendation_samples_cap_at_ten() {
        let results: Vec<ProbeResult> = (0..15)
            .map(|i| result(&format!("/widgets/{i}"), 500, 10))
            .collect();

        let recommendations = build_recommendations(&build_buckets(&results, &HashMap::new()));
        assert_eq!(recommendations.len(), 1);
        assert_eq!(recommendations[0].count, 15);
        assert_eq!(recommendations[0].sample_endpoints.len(), 10);
    }

    #[test]
    fn no_failures_means_no_buckets_or_recommendations() {
        let results = vec![result("/health", 200, 5), result("/widgets", 201, 8)];
        let buckets = build_buckets(&results, &HashMap::new());
        assert!(buckets.is_empty());
        assert!(build_recommendations(&buckets).is_empty());
    }

    #[test]
    fn rate_limited_and_auth_produce_no_recommendations() {
        let results = vec![result("/health", 429, 5), result("/me", 401, 8)];
        let buckets = build_buckets(&results, &HashMap::new());
        assert!(buckets.is_empty());
        assert!(build_recommendations(&buckets).is_empty());
    }

    proptest! {
        #[test]
        fn bucket_totals_partition_results(
            statuses in prop::collection::vec(
                prop::sample::select(vec![200u16, 401, 404, 400, 429, 500, 503, 301]),
                0..60,
            ),
            routes in prop::collection::vec(0usize..5, 0..60),
        ) {
            let n = statuses.len().min(routes.len());
            let results: Vec<ProbeResult> = (0..n)
                .map(|i| result(&format!("/r{}/item", routes[i]), statuses[i], 1))
                .collect();

            let buckets = build_buckets(&results, &HashMap::new());

            let failures: u64 = buckets.iter().map(|b| b.failures).sum();
            let expected = results.iter().filter(|r| r.outcome.is_failure()).count() as u64;
            prop_assert_eq!(failures, expected);

            for bucket in &buckets {
                // Every bucket exists because something in it failed, and
                // its probe count is the sum of its per-outcome counts.
                prop_assert!(bucket.failures > 0);
                prop_assert_eq!(bucket.probes, bucket.counts.total());
            }

            // Each recommendation maps to a failing class with a nonzero
            // count and names at least one affected route.
            for rec in build_recommendations(&buckets) {
                prop_assert!(rec.outcome.is_failure());
                prop_assert!(rec.count > 0);
                prop_assert!(!rec.routes.is_empty());
                prop_assert!(rec.sample_endpoints.len() <= 10);
            }
        }
    }
}
