use crate::driver::ConcurrencyDriver;
use crate::interrupt::Pause;
use std::time::Duration;
use tracing::{info, warn};
use volley_core::{PeakLoadResult, PeakPlan, RequestSpec, Result};

/// Normal round, hold, peak round, hold, recovery round at normal width.
///
/// Always runs all three rounds; an interruption only cuts the holds short.
pub async fn run_peak_load_test(
    driver: &ConcurrencyDriver,
    request: &RequestSpec,
    plan: &PeakPlan,
) -> Result<PeakLoadResult> {
    plan.validate()?;
    let timeout = Duration::from_millis(plan.timeout_ms);

    info!(
        "Starting normal load phase with {} workers, holding {}s",
        plan.normal_width, plan.normal_hold_secs
    );
    let normal = driver.run_round(request, plan.normal_width, timeout).await?;
    hold(driver, "normal", plan.normal_hold_secs).await;

    info!(
        "Starting peak load phase with {} workers, holding {}s",
        plan.peak_width, plan.peak_hold_secs
    );
    let peak = driver.run_round(request, plan.peak_width, timeout).await?;
    hold(driver, "peak", plan.peak_hold_secs).await;

    info!("Returning to normal load with {} workers", plan.normal_width);
    let recovery = driver.run_round(request, plan.normal_width, timeout).await?;

    let result = PeakLoadResult {
        normal,
        peak,
        recovery,
    };
    info!(
        "Peak load finished: normal {:.2}%, peak {:.2}%, recovery {:.2}%, resilient={}",
        normal.success_rate() * 100.0,
        peak.success_rate() * 100.0,
        recovery.success_rate() * 100.0,
        result.is_resilient()
    );
    Ok(result)
}

async fn hold(driver: &ConcurrencyDriver, phase: &str, secs: u64) {
    if driver.interrupt_signal().pause(Duration::from_secs(secs)).await == Pause::Interrupted {
        warn!("Hold after {} phase cut short by interruption", phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::interrupt_channel;
    use crate::testing::{ScriptedExecutor, Step};
    use std::sync::Arc;
    use tokio::time::Instant;
    use volley_core::DriverSettings;

    fn plan() -> PeakPlan {
        PeakPlan {
            normal_width: 10,
            peak_width: 20,
            normal_hold_secs: 5,
            peak_hold_secs: 5,
            timeout_ms: 100,
        }
    }

    /// 10 normal calls, 20 peak calls, then 10 recovery calls
    fn phased(normal_failures: usize, peak_failures: usize, recovery_failures: usize) -> ScriptedExecutor {
        ScriptedExecutor::from_fn(move |call, _| {
            let failing = match call {
                0..=9 => call < normal_failures,
                10..=29 => call - 10 < peak_failures,
                _ => call - 30 < recovery_failures,
            };
            Step::ok(Duration::from_millis(10), if failing { 503 } else { 200 })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_phases_with_holds() {
        let driver = ConcurrencyDriver::new(Arc::new(phased(0, 12, 0)), DriverSettings::default());
        let start = Instant::now();
        let result = run_peak_load_test(&driver, &RequestSpec::get("http://t"), &plan())
            .await
            .unwrap();

        assert_eq!(result.normal.total, 10);
        assert_eq!(result.peak.total, 20);
        assert_eq!(result.peak.success, 8);
        assert_eq!(result.recovery.success, 10);
        assert!(result.is_resilient());
        assert_eq!(start.elapsed(), Duration::from_millis(10_030));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poor_recovery_is_not_resilient() {
        let driver = ConcurrencyDriver::new(Arc::new(phased(0, 0, 2)), DriverSettings::default());
        let result = run_peak_load_test(&driver, &RequestSpec::get("http://t"), &plan())
            .await
            .unwrap();

        assert!((result.recovery.success_rate() - 0.8).abs() < 1e-9);
        assert!(!result.is_resilient());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_still_runs_every_phase() {
        let (interrupter, signal) = interrupt_channel();
        interrupter.interrupt();
        let executor = Arc::new(phased(0, 0, 0));
        let driver =
            ConcurrencyDriver::new(executor.clone(), DriverSettings::default()).with_interrupt(signal);

        let start = Instant::now();
        run_peak_load_test(&driver, &RequestSpec::get("http://t"), &plan())
            .await
            .unwrap();

        assert_eq!(executor.calls(), 40);
        assert_eq!(start.elapsed(), Duration::from_millis(30));
    }
}
