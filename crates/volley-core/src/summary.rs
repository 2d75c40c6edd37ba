//! Round summary

use serde::{Deserialize, Serialize};
use std::fmt;

/// Counts and average latency of one concurrency round.
///
/// `success + failed <= total`: invocations still outstanding when the round's
/// collection deadline passed are in neither count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    /// Requested concurrency width
    pub total: usize,

    /// Invocations that finished with a 2xx within the timeout
    pub success: usize,

    /// Invocations that finished otherwise
    pub failed: usize,

    /// Mean worker-measured duration; `None` when no invocation reported one
    pub avg_response_time_ms: Option<u64>,
}

impl RoundSummary {
    pub fn new(total: usize, success: usize, failed: usize, avg_response_time_ms: Option<u64>) -> Self {
        debug_assert!(success + failed <= total, "round over-counted");
        Self {
            total,
            success,
            failed,
            avg_response_time_ms,
        }
    }

    /// Fraction of the requested width that succeeded
    pub fn success_rate(&self) -> f64 {
        ratio(self.success, self.total)
    }

    /// Fraction of the requested width that failed
    pub fn failure_rate(&self) -> f64 {
        ratio(self.failed, self.total)
    }

    /// Invocations abandoned at the collection deadline
    pub fn unaccounted(&self) -> usize {
        self.total.saturating_sub(self.success + self.failed)
    }

    /// Every launched invocation reported back
    pub fn is_complete(&self) -> bool {
        self.unaccounted() == 0
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

impl fmt::Display for RoundSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Round Result ===")?;
        writeln!(f, "Total Requests: {}", self.total)?;
        writeln!(f, "Successful:     {}", self.success)?;
        writeln!(f, "Failed:         {}", self.failed)?;
        writeln!(f, "Unaccounted:    {}", self.unaccounted())?;
        match self.avg_response_time_ms {
            Some(avg) => write!(f, "Avg Time (ms):  {}", avg),
            None => write!(f, "Avg Time (ms):  n/a"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates() {
        let summary = RoundSummary::new(10, 7, 2, Some(50));
        assert!((summary.success_rate() - 0.7).abs() < f64::EPSILON);
        assert!((summary.failure_rate() - 0.2).abs() < f64::EPSILON);
        assert_eq!(summary.unaccounted(), 1);
        assert!(!summary.is_complete());
    }

    #[test]
    fn test_no_data_is_not_zero() {
        let empty = RoundSummary::new(4, 0, 0, None);
        let instant = RoundSummary::new(4, 4, 0, Some(0));
        assert_ne!(empty.avg_response_time_ms, instant.avg_response_time_ms);
        assert!(format!("{}", empty).contains("n/a"));
        assert!(format!("{}", instant).contains("Avg Time (ms):  0"));
    }

    #[test]
    fn test_display_renders_every_field() {
        let text = RoundSummary::new(5, 5, 0, Some(12)).to_string();
        for needle in ["Total Requests: 5", "Successful:     5", "Failed:         0", "12"] {
            assert!(text.contains(needle), "missing {needle:?} in {text}");
        }
    }
}
