//! Per-invocation outcome

use crate::request::{HttpMethod, RequestSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of the worker that produced an outcome (its launch index in the round)
pub type WorkerId = usize;

/// Result of one request round-trip.
///
/// Produced once per executor call and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvocationOutcome {
    /// Round-trip time reported by the executor
    pub duration_ms: u64,

    /// True for a 2xx response
    pub succeeded: bool,

    /// HTTP status, 0 when no response was received
    pub status_code: u16,

    /// Transport or worker error, if any
    pub error: Option<String>,

    /// Response body length in bytes
    pub body_size_bytes: u64,

    /// Response body, kept for consistency checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// URL actually requested
    pub url: String,

    pub method: HttpMethod,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub worker_id: WorkerId,
}

impl InvocationOutcome {
    /// Outcome of a request that received a response
    pub fn completed(
        worker_id: WorkerId,
        request: &RequestSpec,
        status_code: u16,
        body: Option<String>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            duration_ms,
            succeeded: (200..300).contains(&status_code),
            status_code,
            error: None,
            body_size_bytes: body.as_ref().map(|b| b.len() as u64).unwrap_or(0),
            body,
            url: request.target_url(),
            method: request.method,
            started_at,
            finished_at: finished_at(started_at, duration_ms),
            worker_id,
        }
    }

    /// Outcome of a request that produced no response
    pub fn failed(
        worker_id: WorkerId,
        request: &RequestSpec,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            duration_ms,
            succeeded: false,
            status_code: 0,
            error: Some(error.into()),
            body_size_bytes: 0,
            body: None,
            url: request.target_url(),
            method: request.method,
            started_at,
            finished_at: finished_at(started_at, duration_ms),
            worker_id,
        }
    }

    /// Whether the reported duration stays within `timeout_ms` (inclusive)
    pub fn within_timeout(&self, timeout_ms: u64) -> bool {
        self.duration_ms <= timeout_ms
    }

    /// Success criterion of a basic round: 2xx and within the timeout
    pub fn passes(&self, timeout_ms: u64) -> bool {
        self.succeeded && self.within_timeout(timeout_ms)
    }
}

fn finished_at(started_at: DateTime<Utc>, duration_ms: u64) -> DateTime<Utc> {
    let millis = i64::try_from(duration_ms).unwrap_or(i64::MAX);
    started_at
        .checked_add_signed(chrono::Duration::milliseconds(millis))
        .unwrap_or(started_at)
}
