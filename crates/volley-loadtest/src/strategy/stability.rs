use crate::driver::ConcurrencyDriver;
use crate::interrupt::Pause;
use std::time::Duration;
use tracing::{info, warn};
use volley_core::{RequestSpec, Result, StabilityPlan, StabilityTrace};

/// Repeat the same round `plan.iterations` times, pausing `plan.interval_secs`
/// between rounds. An interrupted pause ends the run with the rounds so far.
pub async fn run_stability_test(
    driver: &ConcurrencyDriver,
    request: &RequestSpec,
    plan: &StabilityPlan,
) -> Result<StabilityTrace> {
    plan.validate()?;
    let timeout = Duration::from_millis(plan.timeout_ms);
    let interval = Duration::from_secs(plan.interval_secs);

    let mut rounds = Vec::with_capacity(plan.iterations);
    let mut interrupted = false;

    for i in 0..plan.iterations {
        info!("Stability iteration {}/{}", i + 1, plan.iterations);
        rounds.push(driver.run_round(request, plan.width, timeout).await?);

        if i + 1 < plan.iterations && driver.interrupt_signal().pause(interval).await == Pause::Interrupted {
            warn!("Stability test interrupted after {} iterations", i + 1);
            interrupted = true;
            break;
        }
    }

    let trace = StabilityTrace {
        rounds,
        interrupted,
    };
    info!(
        "Stability test finished: {} rounds, average times {:?}",
        trace.rounds.len(),
        trace.average_times_ms()
    );
    Ok(trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::interrupt_channel;
    use crate::testing::ScriptedExecutor;
    use std::sync::Arc;
    use tokio::time::Instant;
    use volley_core::DriverSettings;

    fn plan(iterations: usize) -> StabilityPlan {
        StabilityPlan {
            width: 3,
            iterations,
            interval_secs: 5,
            timeout_ms: 1_000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_every_iteration() {
        let driver = ConcurrencyDriver::new(
            Arc::new(ScriptedExecutor::constant(Duration::from_millis(40), 200)),
            DriverSettings::default(),
        );
        let start = Instant::now();
        let trace = run_stability_test(&driver, &RequestSpec::get("http://t"), &plan(4))
            .await
            .unwrap();

        assert_eq!(trace.rounds.len(), 4);
        assert!(!trace.interrupted);
        assert_eq!(trace.average_times_ms(), vec![40; 4]);
        assert!(trace.is_stable(0.1));
        // no pause after the last round
        assert_eq!(start.elapsed(), Duration::from_millis(4 * 40 + 3 * 5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_keeps_collected_rounds() {
        let (interrupter, signal) = interrupt_channel();
        let driver = ConcurrencyDriver::new(
            Arc::new(ScriptedExecutor::constant(Duration::from_millis(40), 200)),
            DriverSettings::default(),
        )
        .with_interrupt(signal);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            interrupter.interrupt();
        });
        let trace = run_stability_test(&driver, &RequestSpec::get("http://t"), &plan(10))
            .await
            .unwrap();

        assert_eq!(trace.rounds.len(), 2);
        assert!(trace.interrupted);
    }
}
