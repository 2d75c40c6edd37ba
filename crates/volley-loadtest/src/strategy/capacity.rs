use crate::driver::ConcurrencyDriver;
use crate::interrupt::Pause;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use volley_core::{CapacityDataPoint, CapacityPlan, CapacityTestResult, RequestSpec, Result, StopReason};

/// Shortest round duration used as the throughput denominator
const MIN_ROUND_SECS: f64 = 0.001;

/// Widen the round by `plan.increment` while tracking successful requests
/// per second of round wall-clock time. Stops once a round's throughput
/// falls below `plan.throughput_threshold`; that round is still recorded.
pub async fn run_capacity_test(
    driver: &ConcurrencyDriver,
    request: &RequestSpec,
    plan: &CapacityPlan,
) -> Result<CapacityTestResult> {
    plan.validate()?;

    info!(
        "Starting capacity test: width {} to {} step {}, threshold {:.2} req/s",
        plan.initial_width, plan.max_width, plan.increment, plan.throughput_threshold
    );

    let timeout = Duration::from_millis(plan.timeout_ms);
    let cooldown = Duration::from_millis(plan.cooldown_ms);
    let mut points = Vec::new();
    let mut stop = StopReason::Completed;
    let mut widths = plan.widths().peekable();

    while let Some(width) = widths.next() {
        let start = Instant::now();
        let summary = driver.run_round(request, width, timeout).await?;
        let secs = start.elapsed().as_secs_f64().max(MIN_ROUND_SECS);
        let throughput = summary.success as f64 / secs;

        let point = CapacityDataPoint {
            thread_count: width,
            success: summary.success,
            failed: summary.failed,
            avg_response_time_ms: summary.avg_response_time_ms,
            throughput,
        };
        info!("{}", point);
        points.push(point);

        if throughput < plan.throughput_threshold {
            warn!(
                "Throughput {:.2} req/s at width {} dropped below {:.2}. Stopping capacity test.",
                throughput, width, plan.throughput_threshold
            );
            stop = StopReason::ThroughputBelowThreshold { width, throughput };
            break;
        }

        if widths.peek().is_some() && driver.interrupt_signal().pause(cooldown).await == Pause::Interrupted {
            warn!("Capacity test interrupted after width {}", width);
            stop = StopReason::Interrupted;
            break;
        }
    }

    let result = CapacityTestResult::from_points(points, plan.initial_width, stop);
    info!(
        "Capacity test finished: optimal width {} at {:.2} req/s",
        result.optimal_thread_count, result.max_throughput
    );
    Ok(result)
}
