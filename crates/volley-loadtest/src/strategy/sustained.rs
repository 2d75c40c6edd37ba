use crate::driver::{invoke, offset, ConcurrencyDriver};
use crate::pool::WorkerPool;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use volley_core::{RequestSpec, Result, SustainedLoadResult, SustainedPlan};

#[derive(Clone, Copy, Debug)]
struct Sample {
    success: bool,
    elapsed_ms: Option<u64>,
}

/// Dispatch one request every `1000 / rate` ms for `plan.duration_secs`.
///
/// Ticks never wait for earlier requests; at most `rate` requests run at
/// once and later ticks queue for a slot. Once the window closes, in-flight
/// requests get `plan.drain_grace_ms` to finish and are abandoned after
/// that. Actual QPS is measured over the whole window including the drain.
pub async fn run_sustained_load_test(
    driver: &ConcurrencyDriver,
    request: &RequestSpec,
    plan: &SustainedPlan,
) -> Result<SustainedLoadResult> {
    plan.validate()?;

    let mut pool = WorkerPool::new(plan.requests_per_second as usize)?;
    let executor = driver.executor();
    let request = Arc::new(request.clone());
    let verbose = driver.settings().verbose;
    let signal = driver.interrupt_signal().clone();

    info!(
        "Starting sustained load: {} req/s for {}s (interval {:?})",
        plan.requests_per_second,
        plan.duration_secs,
        plan.interval()
    );

    let started_at = Utc::now();
    let start = Instant::now();
    let window_end = tokio::time::sleep(plan.duration());
    tokio::pin!(window_end);

    let mut ticker = interval(plan.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    let mut dispatched = 0usize;
    loop {
        tokio::select! {
            biased;
            _ = &mut window_end => break,
            _ = signal.interrupted() => {
                warn!("Sustained load interrupted after {} requests", dispatched);
                break;
            }
            _ = ticker.tick() => {
                let executor = Arc::clone(&executor);
                let request = Arc::clone(&request);
                let worker_id = dispatched;
                pool.spawn(async move {
                    let invocation = invoke(executor.as_ref(), &request, worker_id, verbose).await;
                    let elapsed_ms = invocation.elapsed_ms();
                    match invocation.result {
                        Ok(Some(outcome)) => Sample {
                            success: outcome.succeeded,
                            elapsed_ms: Some(elapsed_ms),
                        },
                        // rejected URLs, executor errors and panics carry no duration
                        Ok(None) | Err(_) => Sample {
                            success: false,
                            elapsed_ms: None,
                        },
                    }
                });
                dispatched += 1;
            }
        }
    }

    debug!(
        "Dispatching stopped with {} of {} requests in flight",
        pool.in_flight(),
        dispatched
    );
    let collected = pool
        .collect_until(Instant::now() + Duration::from_millis(plan.drain_grace_ms))
        .await;
    let finished_at = offset(started_at, start.elapsed());

    let success = collected.completed.iter().filter(|s| s.success).count();
    let failed = collected.completed.len() - success + collected.crashed;
    let response_times: Vec<u64> = collected
        .completed
        .iter()
        .filter_map(|s| s.elapsed_ms)
        .collect();

    if let Some(metrics) = driver.metrics() {
        for sample in &collected.completed {
            metrics.observe_invocation(sample.success, sample.elapsed_ms);
        }
        metrics.observe_abandoned(collected.abandoned);
    }

    let result = SustainedLoadResult::new(
        success,
        failed,
        response_times,
        started_at,
        finished_at,
        plan.requests_per_second,
        collected.abandoned,
    );
    info!(
        "Sustained load finished: {} dispatched, actual {:.2} req/s, success rate {:.2}%",
        dispatched,
        result.actual_qps,
        result.success_rate * 100.0
    );
    Ok(result)
}
