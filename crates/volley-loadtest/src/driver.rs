//! Concurrency driver
//!
//! A round launches `width` invocations of the executor at once, each in its
//! own task of a round-scoped [`WorkerPool`], then collects them until the
//! round's collection deadline. The driver is the single consumer of worker
//! results, so counting needs no shared mutable state.
//!
//! Classification in a basic round:
//!
//! | executor returned              | counted as | duration used for avg |
//! |--------------------------------|------------|-----------------------|
//! | outcome, 2xx, within timeout   | success    | yes                   |
//! | outcome, otherwise             | failed     | yes                   |
//! | `Err` or panic                 | failed     | yes                   |
//! | `None` (URL rejected)          | failed     | no                    |
//! | nothing before the deadline    | neither    | no                    |

use crate::executor::RequestExecutor;
use crate::interrupt::InterruptSignal;
use crate::metrics::EngineMetrics;
use crate::pool::WorkerPool;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use volley_core::{
    integer_mean, summarize, DetailedRoundResult, DriverSettings, InvocationOutcome, RequestSpec,
    Result, RoundSummary, WorkerId,
};

/// Classification of one basic-round invocation
#[derive(Clone, Copy, Debug)]
struct Verdict {
    success: bool,
    elapsed_ms: Option<u64>,
}

/// Runs concurrency rounds against one executor
#[derive(Clone)]
pub struct ConcurrencyDriver {
    executor: Arc<dyn RequestExecutor>,
    settings: DriverSettings,
    interrupt: InterruptSignal,
    metrics: Option<Arc<EngineMetrics>>,
}

impl ConcurrencyDriver {
    pub fn new(executor: Arc<dyn RequestExecutor>, settings: DriverSettings) -> Self {
        Self {
            executor,
            settings,
            interrupt: InterruptSignal::never(),
            metrics: None,
        }
    }

    /// Observe `signal` in every inter-round pause of the strategies
    pub fn with_interrupt(mut self, signal: InterruptSignal) -> Self {
        self.interrupt = signal;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    pub fn interrupt_signal(&self) -> &InterruptSignal {
        &self.interrupt
    }

    pub fn executor(&self) -> Arc<dyn RequestExecutor> {
        Arc::clone(&self.executor)
    }

    pub fn metrics(&self) -> Option<&Arc<EngineMetrics>> {
        self.metrics.as_ref()
    }

    /// Basic round with the timeout given in seconds
    pub async fn run_round_with_timeout_secs(
        &self,
        request: &RequestSpec,
        width: usize,
        timeout_secs: u64,
    ) -> Result<RoundSummary> {
        self.run_round(request, width, Duration::from_secs(timeout_secs))
            .await
    }

    /// Launch `width` concurrent invocations and summarize them.
    ///
    /// Fails only when no pool of `width` workers can be created.
    pub async fn run_round(
        &self,
        request: &RequestSpec,
        width: usize,
        timeout: Duration,
    ) -> Result<RoundSummary> {
        let mut pool = WorkerPool::new(width)?;
        let timeout_ms = millis(timeout);
        let verbose = self.settings.verbose;
        let request = Arc::new(request.clone());
        let deadline = Instant::now() + self.settings.round_deadline();

        debug!("Launching round of {} invocations against {}", width, request.url);
        for worker_id in 0..width {
            let executor = Arc::clone(&self.executor);
            let request = Arc::clone(&request);
            pool.spawn(async move {
                classify(executor, request, worker_id, timeout_ms, verbose).await
            });
        }

        let collected = pool.collect_until(deadline).await;

        let success = collected.completed.iter().filter(|v| v.success).count();
        let failed = collected.completed.len() - success + collected.crashed;
        let durations: Vec<u64> = collected
            .completed
            .iter()
            .filter_map(|v| v.elapsed_ms)
            .collect();

        let summary = RoundSummary::new(width, success, failed, integer_mean(&durations));

        if let Some(metrics) = &self.metrics {
            for verdict in &collected.completed {
                metrics.observe_invocation(verdict.success, verdict.elapsed_ms);
            }
            metrics.observe_round(&summary);
        }

        info!(
            width,
            success,
            failed,
            abandoned = collected.abandoned,
            "Round complete, avg {}",
            summary
                .avg_response_time_ms
                .map(|avg| format!("{}ms", avg))
                .unwrap_or_else(|| "n/a".to_string())
        );
        Ok(summary)
    }

    /// Launch `width` concurrent invocations and keep every outcome.
    ///
    /// Executor errors and panics become failed outcomes; rejected URLs and
    /// lost workers leave no outcome and are counted in `rejected`.
    pub async fn run_detailed(&self, request: &RequestSpec, width: usize) -> Result<DetailedRoundResult> {
        let mut pool = WorkerPool::new(width)?;
        let verbose = self.settings.verbose;
        let request = Arc::new(request.clone());
        let started_at = Utc::now();
        let start = Instant::now();
        let deadline = start + self.settings.detailed_deadline();

        for worker_id in 0..width {
            let executor = Arc::clone(&self.executor);
            let request = Arc::clone(&request);
            pool.spawn(async move { capture(executor, request, worker_id, verbose).await });
        }

        let collected = pool.collect_until(deadline).await;
        let finished_at = offset(started_at, start.elapsed());

        let no_outcome = collected.completed.iter().filter(|o| o.is_none()).count() + collected.crashed;
        let outcomes: Vec<InvocationOutcome> = collected.completed.into_iter().flatten().collect();

        if let Some(metrics) = &self.metrics {
            for outcome in &outcomes {
                metrics.observe_invocation(outcome.succeeded, Some(outcome.duration_ms));
            }
        }

        let result = summarize(outcomes).for_round(width, started_at, finished_at, no_outcome);
        if let Some(metrics) = &self.metrics {
            metrics.observe_round(&result.to_summary());
        }

        info!(
            width,
            success = result.success_count,
            failed = result.fail_count,
            abandoned = collected.abandoned,
            "Detailed round complete: p50={}ms p95={}ms p99={}ms",
            result.median_ms,
            result.p95_ms,
            result.p99_ms
        );
        Ok(result)
    }
}

/// One executor call guarded at the worker boundary
pub(crate) struct Invocation {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,

    /// Executor errors and panics arrive here as their message
    pub result: std::result::Result<Option<InvocationOutcome>, String>,
}

impl Invocation {
    pub fn elapsed_ms(&self) -> u64 {
        millis(self.elapsed)
    }
}

/// Call the executor, timing it and absorbing errors and panics
pub(crate) async fn invoke(
    executor: &dyn RequestExecutor,
    request: &RequestSpec,
    worker_id: WorkerId,
    verbose: bool,
) -> Invocation {
    let started_at = Utc::now();
    let start = Instant::now();
    let result = AssertUnwindSafe(executor.execute(request, worker_id, verbose))
        .catch_unwind()
        .await;
    let elapsed = start.elapsed();

    let result = match result {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(e)) => {
            warn!(worker_id, "Executor failed: {}", e);
            Err(e.to_string())
        }
        Err(panic) => {
            let message = panic_message(&*panic);
            warn!(worker_id, "Worker panicked: {}", message);
            Err(message)
        }
    };

    Invocation {
        started_at,
        elapsed,
        result,
    }
}

async fn classify(
    executor: Arc<dyn RequestExecutor>,
    request: Arc<RequestSpec>,
    worker_id: WorkerId,
    timeout_ms: u64,
    verbose: bool,
) -> Verdict {
    let invocation = invoke(executor.as_ref(), &request, worker_id, verbose).await;
    let elapsed_ms = invocation.elapsed_ms();

    let verdict = match &invocation.result {
        Ok(Some(outcome)) => {
            if !outcome.within_timeout(timeout_ms) {
                debug!(
                    worker_id,
                    "API did not respond within {} ms ({} ms)", timeout_ms, outcome.duration_ms
                );
            }
            Verdict {
                success: outcome.passes(timeout_ms),
                elapsed_ms: Some(elapsed_ms),
            }
        }
        Ok(None) => {
            debug!(worker_id, "Request rejected before sending");
            Verdict {
                success: false,
                elapsed_ms: None,
            }
        }
        Err(_) => Verdict {
            success: false,
            elapsed_ms: Some(elapsed_ms),
        },
    };

    if verbose {
        info!(worker_id, success = verdict.success, elapsed_ms, "Invocation finished");
    } else {
        debug!(worker_id, success = verdict.success, elapsed_ms, "Invocation finished");
    }
    verdict
}

async fn capture(
    executor: Arc<dyn RequestExecutor>,
    request: Arc<RequestSpec>,
    worker_id: WorkerId,
    verbose: bool,
) -> Option<InvocationOutcome> {
    let invocation = invoke(executor.as_ref(), &request, worker_id, verbose).await;
    let elapsed_ms = invocation.elapsed_ms();
    match invocation.result {
        Ok(outcome) => outcome,
        Err(message) => Some(InvocationOutcome::failed(
            worker_id,
            &request,
            message,
            invocation.started_at,
            elapsed_ms,
        )),
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// `start` advanced by a monotonic elapsed time
pub(crate) fn offset(start: DateTime<Utc>, elapsed: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(elapsed)
        .ok()
        .and_then(|d| start.checked_add_signed(d))
        .unwrap_or(start)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
