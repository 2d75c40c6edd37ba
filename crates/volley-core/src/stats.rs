//! Round aggregation and latency statistics
//!
//! Percentiles use the nearest-rank rule over durations sorted ascending:
//!
//! ```text
//! index(p, n) = clamp(ceil(p / 100 * n) - 1, 0, n - 1)
//! ```
//!
//! The median is the 50th percentile under the same rule, so even-sized
//! samples report the lower-middle element rather than an interpolated value.

use crate::outcome::InvocationOutcome;
use crate::summary::RoundSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Nearest-rank index of percentile `p` (0..=100) in a sorted sample of size `n`
pub fn percentile_index(p: f64, n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    // multiply before dividing so integral p and n stay exact
    let rank = (p * n as f64 / 100.0).ceil() as i64 - 1;
    rank.clamp(0, n as i64 - 1) as usize
}

/// Percentile of an already sorted sample; 0 for an empty sample
pub fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    sorted[percentile_index(p, sorted.len())]
}

/// Percentile of an unsorted sample
pub fn percentile_of(values: &[u64], p: f64) -> u64 {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    percentile(&sorted, p)
}

/// Arithmetic mean, `None` for an empty sample
pub fn mean(values: &[u64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: u128 = values.iter().map(|&v| v as u128).sum();
    Some(sum as f64 / values.len() as f64)
}

/// Truncated integer mean, `None` for an empty sample
pub fn integer_mean(values: &[u64]) -> Option<u64> {
    if values.is_empty() {
        return None;
    }
    let sum: u128 = values.iter().map(|&v| v as u128).sum();
    Some((sum / values.len() as u128) as u64)
}

/// Population standard deviation; 0 for an empty sample
pub fn standard_deviation(values: &[u64]) -> f64 {
    let Some(avg) = mean(values) else {
        return 0.0;
    };
    let variance = values
        .iter()
        .map(|&v| (v as f64 - avg).powi(2))
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}

/// True when no sample deviates from the mean by more than `max_deviation`
/// (a ratio, e.g. 0.2 for 20%). Fewer than two samples are always stable.
pub fn is_response_time_stable(values: &[u64], max_deviation: f64) -> bool {
    if values.len() < 2 {
        return true;
    }
    let Some(avg) = mean(values) else {
        return true;
    };
    if avg == 0.0 {
        return values.iter().all(|&v| v == 0);
    }

    match values
        .iter()
        .map(|&v| (v as f64 - avg).abs() / avg)
        .find(|deviation| *deviation > max_deviation)
    {
        Some(deviation) => {
            tracing::debug!(
                "Response time deviates {:.2}% from average {:.2}ms",
                deviation * 100.0,
                avg
            );
            false
        }
        None => true,
    }
}

/// Full outcome sequence of a round plus derived latency statistics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetailedRoundResult {
    /// Requested concurrency width
    pub width: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Outcomes sorted ascending by duration
    pub outcomes: Vec<InvocationOutcome>,

    pub success_count: usize,

    /// Failed outcomes plus invocations whose URL was rejected
    pub fail_count: usize,

    /// Invocations the executor refused to issue
    pub rejected: usize,

    pub min_ms: u64,
    pub max_ms: u64,
    pub avg_ms: u64,
    pub median_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

/// Reduce a batch of outcomes to a [`DetailedRoundResult`].
///
/// The average covers every outcome, failed ones included. An empty batch
/// yields zero for every statistic.
pub fn summarize(mut outcomes: Vec<InvocationOutcome>) -> DetailedRoundResult {
    outcomes.sort_unstable_by_key(|o| o.duration_ms);
    let durations: Vec<u64> = outcomes.iter().map(|o| o.duration_ms).collect();

    let now = Utc::now();
    let started_at = outcomes.iter().map(|o| o.started_at).min().unwrap_or(now);
    let finished_at = outcomes.iter().map(|o| o.finished_at).max().unwrap_or(now);
    let success_count = outcomes.iter().filter(|o| o.succeeded).count();

    DetailedRoundResult {
        width: outcomes.len(),
        started_at,
        finished_at,
        success_count,
        fail_count: outcomes.len() - success_count,
        rejected: 0,
        min_ms: durations.first().copied().unwrap_or(0),
        max_ms: durations.last().copied().unwrap_or(0),
        avg_ms: integer_mean(&durations).unwrap_or(0),
        median_ms: percentile(&durations, 50.0),
        p95_ms: percentile(&durations, 95.0),
        p99_ms: percentile(&durations, 99.0),
        outcomes,
    }
}

impl DetailedRoundResult {
    /// Attach the round's requested width, wall-clock window and rejections
    pub fn for_round(
        mut self,
        width: usize,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        rejected: usize,
    ) -> Self {
        self.width = width;
        self.started_at = started_at;
        self.finished_at = finished_at;
        self.rejected = rejected;
        self.fail_count = self.outcomes.len() - self.success_count + rejected;
        self
    }

    /// Durations in ascending order
    pub fn durations(&self) -> Vec<u64> {
        self.outcomes.iter().map(|o| o.duration_ms).collect()
    }

    /// Arbitrary percentile over the round's durations
    pub fn percentile(&self, p: f64) -> u64 {
        percentile(&self.durations(), p)
    }

    /// Invocations that neither returned nor were rejected before the deadline
    pub fn unaccounted(&self) -> usize {
        self.width
            .saturating_sub(self.success_count + self.fail_count)
    }

    pub fn wall_clock_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Collapse to a [`RoundSummary`]
    pub fn to_summary(&self) -> RoundSummary {
        let avg = if self.outcomes.is_empty() {
            None
        } else {
            Some(self.avg_ms)
        };
        RoundSummary::new(
            self.width.max(self.success_count + self.fail_count),
            self.success_count,
            self.fail_count,
            avg,
        )
    }
}

impl fmt::Display for DetailedRoundResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DetailedRoundResult{{width={}, success={}, fail={}, rejected={}, \
             min={}ms, max={}ms, avg={}ms, median={}ms, p95={}ms, p99={}ms, \
             window={}..{}}}",
            self.width,
            self.success_count,
            self.fail_count,
            self.rejected,
            self.min_ms,
            self.max_ms,
            self.avg_ms,
            self.median_ms,
            self.p95_ms,
            self.p99_ms,
            self.started_at.to_rfc3339(),
            self.finished_at.to_rfc3339(),
        )
    }
}
