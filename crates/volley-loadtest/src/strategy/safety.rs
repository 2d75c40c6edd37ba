use crate::driver::{invoke, ConcurrencyDriver};
use crate::pool::WorkerPool;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};
use volley_core::{ConsistencyReport, RequestSpec, Result, SafetyPlan};

/// What one worker brought back
#[derive(Debug, Default)]
struct WorkerHaul {
    bodies: Vec<String>,
    failed: usize,
}

/// `plan.width` workers each issue `plan.iterations_per_worker` requests in
/// sequence; the bodies of all 2xx responses are pooled and handed to
/// `checker`. Every other request counts toward `failed_requests`.
///
/// A worker that has not finished by the detailed-round deadline, or a run
/// in which every request failed, is inconsistent without consulting
/// `checker`.
pub async fn run_concurrency_safety_test<F>(
    driver: &ConcurrencyDriver,
    request: &RequestSpec,
    plan: &SafetyPlan,
    checker: F,
) -> Result<ConsistencyReport>
where
    F: FnOnce(&[String]) -> bool,
{
    plan.validate()?;

    info!(
        "Starting concurrency safety test: {} workers x {} requests",
        plan.width, plan.iterations_per_worker
    );

    let mut pool = WorkerPool::new(plan.width)?;
    let executor = driver.executor();
    let request = Arc::new(request.clone());
    let verbose = driver.settings().verbose;
    let iterations = plan.iterations_per_worker;
    let deadline = Instant::now() + driver.settings().detailed_deadline();

    for worker_id in 0..plan.width {
        let executor = Arc::clone(&executor);
        let request = Arc::clone(&request);
        pool.spawn(async move {
            let mut haul = WorkerHaul::default();
            for _ in 0..iterations {
                let invocation = invoke(executor.as_ref(), &request, worker_id, verbose).await;
                match invocation.result {
                    Ok(Some(outcome)) if outcome.succeeded && outcome.body.is_some() => {
                        haul.bodies.extend(outcome.body);
                    }
                    _ => haul.failed += 1,
                }
            }
            haul
        });
    }

    let collected = pool.collect_until(deadline).await;
    let workers_completed = collected.completed.len();
    let failed_requests: usize = collected.completed.iter().map(|h| h.failed).sum();
    let bodies: Vec<String> = collected
        .completed
        .into_iter()
        .flat_map(|h| h.bodies)
        .collect();

    let consistent = if workers_completed < plan.width {
        warn!(
            "{} of {} workers did not finish; reporting inconsistent",
            plan.width - workers_completed,
            plan.width
        );
        false
    } else if bodies.is_empty() && failed_requests > 0 {
        warn!(
            "All {} requests failed; nothing to compare, reporting inconsistent",
            failed_requests
        );
        false
    } else {
        checker(&bodies)
    };

    let report = ConsistencyReport {
        consistent,
        workers: plan.width,
        workers_completed,
        bodies_collected: bodies.len(),
        failed_requests,
    };
    info!("{}", report);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedExecutor, Step};
    use std::time::Duration;
    use volley_core::{all_bodies_identical, DriverSettings};

    fn plan() -> SafetyPlan {
        SafetyPlan {
            width: 4,
            iterations_per_worker: 3,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_bodies_are_consistent() {
        let executor = Arc::new(ScriptedExecutor::from_fn(|_, _| {
            Step::body(Duration::from_millis(5), r#"{"balance":100}"#)
        }));
        let driver = ConcurrencyDriver::new(executor.clone(), DriverSettings::default());
        let report = run_concurrency_safety_test(
            &driver,
            &RequestSpec::get("http://t"),
            &plan(),
            all_bodies_identical,
        )
        .await
        .unwrap();

        assert!(report.consistent);
        assert_eq!(report.workers_completed, 4);
        assert_eq!(report.bodies_collected, 12);
        assert_eq!(report.failed_requests, 0);
        assert_eq!(executor.calls(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_diverging_bodies_are_inconsistent() {
        let executor = ScriptedExecutor::from_fn(|call, _| {
            Step::body(Duration::from_millis(5), format!("counter={}", call))
        });
        let driver = ConcurrencyDriver::new(Arc::new(executor), DriverSettings::default());
        let report = run_concurrency_safety_test(
            &driver,
            &RequestSpec::get("http://t"),
            &plan(),
            all_bodies_identical,
        )
        .await
        .unwrap();

        assert!(!report.consistent);
        assert_eq!(report.bodies_collected, 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_requests_are_skipped() {
        let executor = ScriptedExecutor::cycle(vec![
            Step::body(Duration::from_millis(5), "ok"),
            Step::Error,
            Step::Panic,
            Step::Reject,
        ]);
        let driver = ConcurrencyDriver::new(Arc::new(executor), DriverSettings::default());
        let mut seen = 0;
        let report = run_concurrency_safety_test(
            &driver,
            &RequestSpec::get("http://t"),
            &plan(),
            |bodies| {
                seen = bodies.len();
                true
            },
        )
        .await
        .unwrap();

        assert!(report.consistent);
        assert_eq!(seen, 3);
        assert_eq!(report.failed_requests, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_responses_are_not_pooled() {
        let executor = ScriptedExecutor::from_fn(|_, _| Step::Respond {
            delay: Duration::from_millis(5),
            status: 503,
            body: Some("busy".to_string()),
        });
        let driver = ConcurrencyDriver::new(Arc::new(executor), DriverSettings::default());
        let mut called = false;
        let plan = SafetyPlan {
            width: 2,
            iterations_per_worker: 2,
        };
        let report = run_concurrency_safety_test(&driver, &RequestSpec::get("http://t"), &plan, |bodies| {
            called = true;
            all_bodies_identical(bodies)
        })
        .await
        .unwrap();

        assert!(!called);
        assert!(!report.consistent);
        assert_eq!(report.bodies_collected, 0);
        assert_eq!(report.failed_requests, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_successful_bodies_reach_checker() {
        let executor = ScriptedExecutor::cycle(vec![
            Step::body(Duration::from_millis(5), "ok"),
            Step::Respond {
                delay: Duration::from_millis(5),
                status: 500,
                body: Some("stack trace".to_string()),
            },
        ]);
        let driver = ConcurrencyDriver::new(Arc::new(executor), DriverSettings::default());
        let mut pooled = Vec::new();
        let report = run_concurrency_safety_test(&driver, &RequestSpec::get("http://t"), &plan(), |bodies| {
            pooled = bodies.to_vec();
            all_bodies_identical(bodies)
        })
        .await
        .unwrap();

        assert!(report.consistent);
        assert_eq!(pooled, vec!["ok".to_string(); 6]);
        assert_eq!(report.failed_requests, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_worker_skips_checker() {
        let executor = ScriptedExecutor::cycle(vec![
            Step::body(Duration::from_millis(5), "ok"),
            Step::body(Duration::from_secs(3_600), "late"),
        ]);
        let driver = ConcurrencyDriver::new(Arc::new(executor), DriverSettings::default());
        let mut called = false;
        let report = run_concurrency_safety_test(
            &driver,
            &RequestSpec::get("http://t"),
            &plan(),
            |_| {
                called = true;
                true
            },
        )
        .await
        .unwrap();

        assert!(!called);
        assert!(!report.consistent);
        assert_eq!(report.workers_completed, 2);
    }
}
