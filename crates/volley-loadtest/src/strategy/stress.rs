use crate::driver::ConcurrencyDriver;
use crate::interrupt::Pause;
use std::time::Duration;
use tracing::{info, warn};
use volley_core::{RequestSpec, Result, StopReason, StressPlan, StressTestTrace};

/// Widen the round by `plan.step` until a round's failure rate exceeds
/// `plan.acceptable_fail_rate` or `plan.max_width` is passed.
///
/// The round that trips the threshold is the last one in the trace.
pub async fn run_stress_test(
    driver: &ConcurrencyDriver,
    request: &RequestSpec,
    plan: &StressPlan,
) -> Result<StressTestTrace> {
    plan.validate()?;

    info!(
        "Starting stress test: width {} to {} step {}, acceptable fail rate {:.2}%",
        plan.start_width,
        plan.max_width,
        plan.step,
        plan.acceptable_fail_rate * 100.0
    );

    let timeout = Duration::from_millis(plan.timeout_ms);
    let cooldown = Duration::from_millis(plan.cooldown_ms);
    let mut rounds = Vec::new();
    let mut stop = StopReason::Completed;
    let mut widths = plan.widths().peekable();

    while let Some(width) = widths.next() {
        info!("Stress round with width {}", width);
        let summary = driver.run_round(request, width, timeout).await?;
        rounds.push(summary);

        let fail_rate = summary.failure_rate();
        if fail_rate > plan.acceptable_fail_rate {
            warn!(
                "Fail rate {:.2}% at width {} exceeds {:.2}%. Stopping stress test.",
                fail_rate * 100.0,
                width,
                plan.acceptable_fail_rate * 100.0
            );
            stop = StopReason::FailureRateExceeded { width, fail_rate };
            break;
        }

        if widths.peek().is_some() && driver.interrupt_signal().pause(cooldown).await == Pause::Interrupted {
            warn!("Stress test interrupted after width {}", width);
            stop = StopReason::Interrupted;
            break;
        }
    }

    info!("Stress test finished after {} rounds: {}", rounds.len(), stop);
    Ok(StressTestTrace { rounds, stop })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::interrupt_channel;
    use crate::testing::{ScriptedExecutor, Step};
    use std::sync::Arc;
    use volley_core::DriverSettings;

    fn plan() -> StressPlan {
        StressPlan {
            start_width: 2,
            max_width: 8,
            step: 2,
            acceptable_fail_rate: 0.25,
            timeout_ms: 100,
            cooldown_ms: 1_000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_every_width_when_healthy() {
        let driver = ConcurrencyDriver::new(
            Arc::new(ScriptedExecutor::constant(Duration::from_millis(10), 200)),
            DriverSettings::default(),
        );
        let trace = run_stress_test(&driver, &RequestSpec::get("http://t"), &plan())
            .await
            .unwrap();

        let widths: Vec<usize> = trace.rounds.iter().map(|r| r.total).collect();
        assert_eq!(widths, vec![2, 4, 6, 8]);
        assert_eq!(trace.stop, StopReason::Completed);
        assert_eq!(trace.max_healthy_width(), Some(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_halts_at_first_round_over_threshold() {
        // the first 6 calls (widths 2 and 4) succeed, everything after fails
        let executor = ScriptedExecutor::from_fn(|call, _| {
            if call < 6 {
                Step::ok(Duration::from_millis(10), 200)
            } else {
                Step::ok(Duration::from_millis(10), 500)
            }
        });
        let driver = ConcurrencyDriver::new(Arc::new(executor), DriverSettings::default());
        let trace = run_stress_test(&driver, &RequestSpec::get("http://t"), &plan())
            .await
            .unwrap();

        assert_eq!(trace.rounds.len(), 3);
        assert_eq!(
            trace.stop,
            StopReason::FailureRateExceeded {
                width: 6,
                fail_rate: 1.0
            }
        );
        assert_eq!(trace.breaking_point().map(|r| r.total), Some(6));
        assert_eq!(trace.max_healthy_width(), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_cooldown_keeps_finished_rounds() {
        let (interrupter, signal) = interrupt_channel();
        let driver = ConcurrencyDriver::new(
            Arc::new(ScriptedExecutor::constant(Duration::from_millis(10), 200)),
            DriverSettings::default(),
        )
        .with_interrupt(signal);

        // lands inside the first one-second cooldown
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            interrupter.interrupt();
        });

        let trace = run_stress_test(&driver, &RequestSpec::get("http://t"), &plan())
            .await
            .unwrap();

        assert_eq!(trace.stop, StopReason::Interrupted);
        assert_eq!(trace.rounds.len(), 1);
        assert_eq!(trace.rounds[0].total, 2);
        assert_eq!(trace.rounds[0].success, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_interrupted_runs_a_single_round() {
        let (interrupter, signal) = interrupt_channel();
        interrupter.interrupt();
        let executor = Arc::new(ScriptedExecutor::constant(Duration::from_millis(10), 200));
        let driver = ConcurrencyDriver::new(executor.clone(), DriverSettings::default())
            .with_interrupt(signal);

        let trace = run_stress_test(&driver, &RequestSpec::get("http://t"), &plan())
            .await
            .unwrap();

        assert_eq!(trace.stop, StopReason::Interrupted);
        assert_eq!(trace.rounds.len(), 1);
        assert_eq!(executor.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalid_plan_is_rejected() {
        let driver = ConcurrencyDriver::new(
            Arc::new(ScriptedExecutor::constant(Duration::ZERO, 200)),
            DriverSettings::default(),
        );
        let plan = StressPlan {
            step: 0,
            ..plan()
        };
        let err = run_stress_test(&driver, &RequestSpec::get("http://t"), &plan)
            .await
            .unwrap_err();
        assert!(err.is_config_error());
    }
}
