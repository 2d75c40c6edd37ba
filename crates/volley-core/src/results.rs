//! Strategy results
//!
//! All of these are built once a strategy finishes and are read-only
//! afterwards. Each renders every field through `Display`.

use crate::stats::{integer_mean, is_response_time_stable, percentile_of};
use crate::summary::RoundSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Allowed gap between normal and recovery success rates for a resilient target
pub const RESILIENCE_TOLERANCE: f64 = 0.10;

/// Why a strategy loop ended
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// The plan ran to its configured end
    Completed,
    /// A round failed more often than tolerated
    FailureRateExceeded { width: usize, fail_rate: f64 },
    /// A round's successful throughput fell below the floor
    ThroughputBelowThreshold { width: usize, throughput: f64 },
    /// An inter-round pause was interrupted
    Interrupted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::FailureRateExceeded { width, fail_rate } => write!(
                f,
                "fail rate {:.2}% at width {}",
                fail_rate * 100.0,
                width
            ),
            Self::ThroughputBelowThreshold { width, throughput } => write!(
                f,
                "throughput {:.2} req/s at width {}",
                throughput, width
            ),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

// ============================================================================
// STRESS
// ============================================================================

/// One round per width step; ends at the first round over the failure threshold
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StressTestTrace {
    pub rounds: Vec<RoundSummary>,
    pub stop: StopReason,
}

impl StressTestTrace {
    /// The round that tripped the failure threshold, if any
    pub fn breaking_point(&self) -> Option<&RoundSummary> {
        match self.stop {
            StopReason::FailureRateExceeded { .. } => self.rounds.last(),
            _ => None,
        }
    }

    /// Widest round that stayed within the threshold
    pub fn max_healthy_width(&self) -> Option<usize> {
        let healthy = match self.stop {
            StopReason::FailureRateExceeded { .. } => &self.rounds[..self.rounds.len().saturating_sub(1)],
            _ => &self.rounds[..],
        };
        healthy.last().map(|r| r.total)
    }
}

impl fmt::Display for StressTestTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "StressTestTrace{{rounds={}, stop={}}}", self.rounds.len(), self.stop)?;
        writeln!(f, "{:>8} {:>8} {:>8} {:>10} {:>10}", "Width", "Success", "Failed", "Fail%", "Avg(ms)")?;
        for round in &self.rounds {
            writeln!(
                f,
                "{:>8} {:>8} {:>8} {:>10.2} {:>10}",
                round.total,
                round.success,
                round.failed,
                round.failure_rate() * 100.0,
                fmt_avg(round.avg_response_time_ms)
            )?;
        }
        Ok(())
    }
}

// ============================================================================
// SUSTAINED LOAD
// ============================================================================

/// Counts and durations gathered at a fixed dispatch rate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SustainedLoadResult {
    pub success_count: usize,
    pub fail_count: usize,

    /// Worker-measured duration of every request that returned, in completion order
    pub response_times_ms: Vec<u64>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub target_qps: u32,

    /// Completed requests per wall-clock second
    pub actual_qps: f64,

    pub avg_response_time_ms: u64,

    /// `success / (success + fail)`, 0 when nothing completed
    pub success_rate: f64,

    /// Requests still running when the drain grace expired
    pub abandoned: usize,
}

impl SustainedLoadResult {
    pub fn new(
        success_count: usize,
        fail_count: usize,
        response_times_ms: Vec<u64>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        target_qps: u32,
        abandoned: usize,
    ) -> Self {
        let completed = success_count + fail_count;
        let elapsed_secs = (finished_at - started_at).num_milliseconds() as f64 / 1000.0;
        let actual_qps = if elapsed_secs > 0.0 {
            completed as f64 / elapsed_secs
        } else {
            0.0
        };
        let success_rate = if completed > 0 {
            success_count as f64 / completed as f64
        } else {
            0.0
        };

        Self {
            success_count,
            fail_count,
            avg_response_time_ms: integer_mean(&response_times_ms).unwrap_or(0),
            response_times_ms,
            started_at,
            finished_at,
            target_qps,
            actual_qps,
            success_rate,
            abandoned,
        }
    }

    pub fn percentile(&self, p: f64) -> u64 {
        percentile_of(&self.response_times_ms, p)
    }
}

impl fmt::Display for SustainedLoadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SustainedLoadResult{{success={}, fail={}, abandoned={}, targetQPS={}, actualQPS={:.2}, \
             avgResponse={}ms, p95={}ms, successRate={:.2}%, samples={}, window={}..{}}}",
            self.success_count,
            self.fail_count,
            self.abandoned,
            self.target_qps,
            self.actual_qps,
            self.avg_response_time_ms,
            self.percentile(95.0),
            self.success_rate * 100.0,
            self.response_times_ms.len(),
            self.started_at.to_rfc3339(),
            self.finished_at.to_rfc3339(),
        )
    }
}

// ============================================================================
// PEAK LOAD
// ============================================================================

/// Normal, peak and recovery round snapshots
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeakLoadResult {
    pub normal: RoundSummary,
    pub peak: RoundSummary,
    pub recovery: RoundSummary,
}

impl PeakLoadResult {
    /// Recovery success rate is back within [`RESILIENCE_TOLERANCE`] of normal
    pub fn is_resilient(&self) -> bool {
        (self.normal.success_rate() - self.recovery.success_rate()).abs() < RESILIENCE_TOLERANCE
    }
}

impl fmt::Display for PeakLoadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PeakLoadResult{{resilient={}}}", self.is_resilient())?;
        writeln!(f, "--- normal ---\n{}", self.normal)?;
        writeln!(f, "--- peak ---\n{}", self.peak)?;
        write!(f, "--- recovery ---\n{}", self.recovery)
    }
}

// ============================================================================
// STABILITY
// ============================================================================

/// Repeated rounds at a fixed width
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StabilityTrace {
    pub rounds: Vec<RoundSummary>,
    pub interrupted: bool,
}

impl StabilityTrace {
    /// Average time of every round that reported one
    pub fn average_times_ms(&self) -> Vec<u64> {
        self.rounds
            .iter()
            .filter_map(|r| r.avg_response_time_ms)
            .collect()
    }

    pub fn success_rates(&self) -> Vec<f64> {
        self.rounds.iter().map(RoundSummary::success_rate).collect()
    }

    /// No round's average deviates from the mean of averages by more than `max_deviation`
    pub fn is_stable(&self, max_deviation: f64) -> bool {
        is_response_time_stable(&self.average_times_ms(), max_deviation)
    }
}

impl fmt::Display for StabilityTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "StabilityTrace{{rounds={}, interrupted={}}}",
            self.rounds.len(),
            self.interrupted
        )?;
        for (i, round) in self.rounds.iter().enumerate() {
            writeln!(
                f,
                "  #{:<4} success={} failed={} total={} avg={}ms",
                i + 1,
                round.success,
                round.failed,
                round.total,
                fmt_avg(round.avg_response_time_ms)
            )?;
        }
        Ok(())
    }
}

// ============================================================================
// CAPACITY
// ============================================================================

/// One capacity step
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapacityDataPoint {
    pub thread_count: usize,
    pub success: usize,
    pub failed: usize,
    pub avg_response_time_ms: Option<u64>,

    /// Successful requests per second of round wall-clock time
    pub throughput: f64,
}

impl fmt::Display for CapacityDataPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CapacityDataPoint{{threads={}, success={}, fail={}, avgTime={}ms, throughput={:.2} req/s}}",
            self.thread_count,
            self.success,
            self.failed,
            fmt_avg(self.avg_response_time_ms),
            self.throughput
        )
    }
}

/// Capacity trace and the step with the highest throughput
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapacityTestResult {
    pub data_points: Vec<CapacityDataPoint>,
    pub optimal_thread_count: usize,
    pub max_throughput: f64,
    pub stop: StopReason,
}

impl CapacityTestResult {
    /// Pick the first step with strictly maximal throughput. With no step
    /// above zero the optimum stays at `initial_thread_count`.
    pub fn from_points(
        data_points: Vec<CapacityDataPoint>,
        initial_thread_count: usize,
        stop: StopReason,
    ) -> Self {
        let mut optimal_thread_count = initial_thread_count;
        let mut max_throughput = 0.0;
        for point in &data_points {
            if point.throughput > max_throughput {
                max_throughput = point.throughput;
                optimal_thread_count = point.thread_count;
            }
        }
        Self {
            data_points,
            optimal_thread_count,
            max_throughput,
            stop,
        }
    }
}

impl fmt::Display for CapacityTestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "CapacityTestResult{{optimalThreads={}, maxThroughput={:.2} req/s, dataPoints={}, stop={}}}",
            self.optimal_thread_count,
            self.max_throughput,
            self.data_points.len(),
            self.stop
        )?;
        for point in &self.data_points {
            writeln!(f, "  {}", point)?;
        }
        Ok(())
    }
}

// ============================================================================
// CONCURRENCY SAFETY
// ============================================================================

/// Verdict of a concurrency-safety run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// Caller predicate result; false whenever a worker did not finish
    pub consistent: bool,
    pub workers: usize,
    pub workers_completed: usize,

    /// Bodies handed to the predicate
    pub bodies_collected: usize,

    /// Requests that produced no body
    pub failed_requests: usize,
}

impl fmt::Display for ConsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConsistencyReport{{consistent={}, workers={}/{}, bodies={}, failedRequests={}}}",
            self.consistent,
            self.workers_completed,
            self.workers,
            self.bodies_collected,
            self.failed_requests
        )
    }
}

/// Consistency predicate accepting only identical bodies
pub fn all_bodies_identical(bodies: &[String]) -> bool {
    bodies.windows(2).all(|pair| pair[0] == pair[1])
}

fn fmt_avg(avg: Option<u64>) -> String {
    avg.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
}
