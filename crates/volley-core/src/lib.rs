//! # Volley Core
//!
//! Value types and pure logic shared by the Volley load-generation engine.
//!
//! This crate provides the building blocks the async engine composes:
//! - `RequestSpec` - The target of every invocation (URL, method, params, headers)
//! - `InvocationOutcome` - What one request round-trip produced
//! - `RoundSummary` - Counts and average latency of one concurrency round
//! - `DetailedRoundResult` - The round aggregator: sorted outcomes plus percentiles
//! - Strategy plans and results (stress, sustained, peak, stability, capacity, safety)
//!
//! ## Data flow
//!
//! ```text
//!   strategy plan ──► driver ──► executor (fan-out, one per worker)
//!        ▲                              │
//!        │                              ▼
//!   strategy result ◄── aggregator ◄── outcomes (fan-in)
//! ```
//!
//! Nothing in this crate performs I/O on behalf of a round; all results are
//! immutable values built once a round or strategy step completes.

pub mod error;
pub mod outcome;
pub mod plan;
pub mod request;
pub mod results;
pub mod stats;
pub mod summary;

pub use error::*;
pub use outcome::*;
pub use plan::*;
pub use request::*;
pub use results::*;
pub use stats::*;
pub use summary::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Result, VolleyError};
    pub use crate::outcome::InvocationOutcome;
    pub use crate::request::{HttpMethod, RequestSpec};
    pub use crate::results::*;
    pub use crate::stats::{summarize, DetailedRoundResult};
    pub use crate::summary::RoundSummary;
}
