//! End-to-end properties of the concurrency engine
//!
//! Scripted executors and tokio's paused clock make every duration exact,
//! so counts and averages can be checked to the millisecond.

use std::sync::Arc;
use std::time::Duration;
use volley_core::{
    integer_mean, percentile_index, CapacityPlan, DriverSettings, RequestSpec, RoundSummary, StopReason,
    StressPlan,
};
use volley_loadtest::testing::{ScriptedExecutor, Step};
use volley_loadtest::{run_capacity_test, run_stress_test, ConcurrencyDriver, EngineMetrics};

fn request() -> RequestSpec {
    RequestSpec::get("http://service.test/api")
}

fn driver(executor: ScriptedExecutor) -> ConcurrencyDriver {
    ConcurrencyDriver::new(Arc::new(executor), DriverSettings::default())
}

mod round_properties {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ten_fast_successes() {
        let summary = driver(ScriptedExecutor::constant(Duration::from_millis(50), 200))
            .run_round(&request(), 10, Duration::from_millis(1000))
            .await
            .unwrap();

        assert_eq!(summary, RoundSummary::new(10, 10, 0, Some(50)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_counts_never_exceed_width() {
        let script = |call: usize, _worker: usize| match call % 6 {
            0 => Step::ok(Duration::from_millis(20), 200),
            1 => Step::ok(Duration::from_millis(2_000), 200),
            2 => Step::Error,
            3 => Step::Reject,
            4 => Step::ok(Duration::from_secs(120), 200),
            _ => Step::Panic,
        };

        for width in [1, 5, 6, 13, 40] {
            let summary = driver(ScriptedExecutor::from_fn(script))
                .run_round(&request(), width, Duration::from_millis(1000))
                .await
                .unwrap();

            assert_eq!(summary.total, width);
            assert!(summary.success + summary.failed <= summary.total);
            assert_eq!(
                summary.success + summary.failed + summary.unaccounted(),
                summary.total
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_average_matches_counted_invocations() {
        let delays = [12u64, 40, 7, 95, 33, 61];
        let executor = ScriptedExecutor::from_fn(move |_, worker| {
            Step::ok(Duration::from_millis(delays[worker]), 200)
        });
        let summary = driver(executor)
            .run_round(&request(), delays.len(), Duration::from_millis(1000))
            .await
            .unwrap();

        assert_eq!(summary.avg_response_time_ms, integer_mean(&delays));
        assert_eq!(summary.avg_response_time_ms, Some(41));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_invocations_leave_average_alone() {
        let executor = ScriptedExecutor::from_fn(|_, worker| {
            if worker < 2 {
                Step::ok(Duration::from_millis(30), 200)
            } else {
                Step::ok(Duration::from_secs(3_600), 200)
            }
        });
        let summary = driver(executor)
            .run_round(&request(), 5, Duration::from_millis(1000))
            .await
            .unwrap();

        assert_eq!(summary.success, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.unaccounted(), 3);
        assert_eq!(summary.avg_response_time_ms, Some(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detailed_percentiles_follow_nearest_rank() {
        // worker i answers in (i + 1) * 10 ms
        let executor =
            ScriptedExecutor::from_fn(|_, worker| Step::ok(Duration::from_millis((worker as u64 + 1) * 10), 200));
        let result = driver(executor).run_detailed(&request(), 20).await.unwrap();

        let durations = result.durations();
        assert_eq!(durations.len(), 20);
        assert_eq!(result.min_ms, 10);
        assert_eq!(result.max_ms, 200);
        assert_eq!(result.median_ms, durations[percentile_index(50.0, 20)]);
        assert_eq!(result.median_ms, 100);
        assert_eq!(result.p95_ms, 190);
        assert_eq!(result.p99_ms, 200);
        assert_eq!(result.avg_ms, 105);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_follow_rounds() {
        let metrics = Arc::new(EngineMetrics::new().unwrap());
        let executor = ScriptedExecutor::cycle(vec![
            Step::ok(Duration::from_millis(10), 200),
            Step::ok(Duration::from_millis(10), 500),
        ]);
        let driver = driver(executor).with_metrics(Arc::clone(&metrics));

        driver
            .run_round(&request(), 4, Duration::from_millis(1000))
            .await
            .unwrap();
        driver
            .run_round(&request(), 4, Duration::from_millis(1000))
            .await
            .unwrap();

        assert_eq!(metrics.rounds(), 2);
        assert_eq!(metrics.invocation_count("success"), 4);
        assert_eq!(metrics.invocation_count("failure"), 4);
        let text = metrics.render().unwrap();
        assert!(text.contains("volley_invocations_total"));
        assert!(text.contains("volley_invocation_latency_ms_count 8"));
    }
}

mod strategy_properties {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_stress_trace_ends_at_first_breach() {
        // success rate falls as the round widens past 20
        let executor = ScriptedExecutor::from_fn(|_, worker| {
            let status = if worker >= 20 { 503 } else { 200 };
            Step::ok(Duration::from_millis(15), status)
        });
        let plan = StressPlan {
            start_width: 10,
            max_width: 60,
            step: 10,
            acceptable_fail_rate: 0.2,
            timeout_ms: 1_000,
            cooldown_ms: 1_000,
        };
        let trace = run_stress_test(&driver(executor), &request(), &plan).await.unwrap();

        // width 30 fails 1/3 > 0.2
        let widths: Vec<usize> = trace.rounds.iter().map(|r| r.total).collect();
        assert_eq!(widths, vec![10, 20, 30]);
        assert!(matches!(trace.stop, StopReason::FailureRateExceeded { width: 30, .. }));
        for round in &trace.rounds[..2] {
            assert!(round.failure_rate() <= plan.acceptable_fail_rate);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_keeps_single_best_round() {
        // the target serves at most 20 requests per 100 ms
        let executor = ScriptedExecutor::from_fn(|_, worker| {
            let batch = worker as u64 / 20;
            Step::ok(Duration::from_millis((batch + 1) * 100), 200)
        });
        let plan = CapacityPlan {
            initial_width: 10,
            max_width: 50,
            increment: 10,
            throughput_threshold: 1.0,
            timeout_ms: 10_000,
            cooldown_ms: 2_000,
        };
        let result = run_capacity_test(&driver(executor), &request(), &plan)
            .await
            .unwrap();

        let throughputs: Vec<f64> = result.data_points.iter().map(|p| p.throughput).collect();
        assert_eq!(throughputs.len(), 5);
        // widths 10..50 run in 100, 100, 200, 200, 300 ms
        let expected = [100.0, 200.0, 150.0, 200.0, 500.0 / 3.0];
        for (got, want) in throughputs.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "{} vs {}", got, want);
        }
        assert_eq!(result.optimal_thread_count, 20);
        assert!((result.max_throughput - 200.0).abs() < 1e-6);
    }
}
