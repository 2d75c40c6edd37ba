//! Driver settings and strategy plans
//!
//! Every plan is a plain serde value with defaults, so callers can build one
//! in code or deserialize it from a profile. `validate` rejects values no
//! round could run with; those surface as configuration errors before any
//! request is sent.

use crate::error::{Result, VolleyError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by every round a driver runs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    /// Collection deadline of a basic round
    pub round_deadline_ms: u64,

    /// Collection deadline of a detailed round and of a safety run
    pub detailed_deadline_ms: u64,

    /// Log every invocation at info level
    pub verbose: bool,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            round_deadline_ms: 60_000,
            detailed_deadline_ms: 120_000,
            verbose: false,
        }
    }
}

impl DriverSettings {
    pub fn round_deadline(&self) -> Duration {
        Duration::from_millis(self.round_deadline_ms)
    }

    pub fn detailed_deadline(&self) -> Duration {
        Duration::from_millis(self.detailed_deadline_ms)
    }
}

/// Stress: widen the round each step until failures exceed the acceptable rate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressPlan {
    pub start_width: usize,
    pub max_width: usize,
    pub step: usize,

    /// Highest tolerated `failed / total`, 0.0..=1.0
    pub acceptable_fail_rate: f64,

    /// Per-request timeout used for success classification
    pub timeout_ms: u64,

    /// Pause between rounds
    pub cooldown_ms: u64,
}

impl Default for StressPlan {
    fn default() -> Self {
        Self {
            start_width: 10,
            max_width: 100,
            step: 10,
            acceptable_fail_rate: 0.05,
            timeout_ms: 1_000,
            cooldown_ms: 1_000,
        }
    }
}

impl StressPlan {
    pub fn validate(&self) -> Result<()> {
        require_positive("start_width", self.start_width)?;
        require_positive("step", self.step)?;
        if self.start_width > self.max_width {
            return Err(VolleyError::config(format!(
                "start_width {} exceeds max_width {}",
                self.start_width, self.max_width
            )));
        }
        require_ratio("acceptable_fail_rate", self.acceptable_fail_rate)
    }

    /// Widths visited when no round trips the failure threshold
    pub fn widths(&self) -> impl Iterator<Item = usize> {
        (self.start_width..=self.max_width).step_by(self.step.max(1))
    }
}

/// Sustained load: a fixed request rate held for a wall-clock window
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SustainedPlan {
    pub duration_secs: u64,

    /// Target rate, 1..=1000 requests per second
    pub requests_per_second: u32,

    /// Time granted to in-flight requests once dispatching stops
    pub drain_grace_ms: u64,
}

impl Default for SustainedPlan {
    fn default() -> Self {
        Self {
            duration_secs: 60,
            requests_per_second: 10,
            drain_grace_ms: 10_000,
        }
    }
}

impl SustainedPlan {
    pub fn validate(&self) -> Result<()> {
        if self.duration_secs == 0 {
            return Err(VolleyError::config("duration_secs must be positive"));
        }
        if !(1..=1000).contains(&self.requests_per_second) {
            return Err(VolleyError::config(format!(
                "requests_per_second must be within 1..=1000, got {}",
                self.requests_per_second
            )));
        }
        Ok(())
    }

    /// Dispatch interval: `1000 / rate` whole milliseconds
    pub fn interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.requests_per_second.max(1)))
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// Peak load: normal, peak, then normal again
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakPlan {
    pub normal_width: usize,
    pub peak_width: usize,

    /// Hold after the normal phase
    pub normal_hold_secs: u64,

    /// Hold after the peak phase
    pub peak_hold_secs: u64,

    pub timeout_ms: u64,
}

impl Default for PeakPlan {
    fn default() -> Self {
        Self {
            normal_width: 10,
            peak_width: 100,
            normal_hold_secs: 5,
            peak_hold_secs: 5,
            timeout_ms: 1_000,
        }
    }
}

impl PeakPlan {
    pub fn validate(&self) -> Result<()> {
        require_positive("normal_width", self.normal_width)?;
        require_positive("peak_width", self.peak_width)
    }
}

/// Stability: the same round repeated at a fixed interval
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityPlan {
    pub width: usize,
    pub iterations: usize,
    pub interval_secs: u64,
    pub timeout_ms: u64,
}

impl Default for StabilityPlan {
    fn default() -> Self {
        Self {
            width: 10,
            iterations: 10,
            interval_secs: 5,
            timeout_ms: 1_000,
        }
    }
}

impl StabilityPlan {
    pub fn validate(&self) -> Result<()> {
        require_positive("width", self.width)
    }
}

/// Capacity: widen the round until successful throughput falls below a floor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityPlan {
    pub initial_width: usize,
    pub max_width: usize,
    pub increment: usize,

    /// Requests per second below which the target counts as overloaded
    pub throughput_threshold: f64,

    pub timeout_ms: u64,
    pub cooldown_ms: u64,
}

impl Default for CapacityPlan {
    fn default() -> Self {
        Self {
            initial_width: 10,
            max_width: 200,
            increment: 10,
            throughput_threshold: 1.0,
            timeout_ms: 1_000,
            cooldown_ms: 2_000,
        }
    }
}

impl CapacityPlan {
    pub fn validate(&self) -> Result<()> {
        require_positive("initial_width", self.initial_width)?;
        require_positive("increment", self.increment)?;
        if self.initial_width > self.max_width {
            return Err(VolleyError::config(format!(
                "initial_width {} exceeds max_width {}",
                self.initial_width, self.max_width
            )));
        }
        if !self.throughput_threshold.is_finite() || self.throughput_threshold < 0.0 {
            return Err(VolleyError::config("throughput_threshold must be a non-negative number"));
        }
        Ok(())
    }

    pub fn widths(&self) -> impl Iterator<Item = usize> {
        (self.initial_width..=self.max_width).step_by(self.increment.max(1))
    }
}

/// Concurrency safety: each worker issues a sequence of requests
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyPlan {
    pub width: usize,
    pub iterations_per_worker: usize,
}

impl Default for SafetyPlan {
    fn default() -> Self {
        Self {
            width: 10,
            iterations_per_worker: 5,
        }
    }
}

impl SafetyPlan {
    pub fn validate(&self) -> Result<()> {
        require_positive("width", self.width)
    }
}

fn require_positive(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(VolleyError::config(format!("{} must be positive", name)));
    }
    Ok(())
}

fn require_ratio(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(VolleyError::config(format!(
            "{} must be within 0.0..=1.0, got {}",
            name, value
        )));
    }
    Ok(())
}
