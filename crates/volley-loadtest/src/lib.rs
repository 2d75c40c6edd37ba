//! # Volley Load Test Engine
//!
//! Concurrent load generation against an HTTP endpoint.
//!
//! ## Building blocks
//!
//! - [`RequestExecutor`] - One request round-trip ([`HttpExecutor`] in production)
//! - [`WorkerPool`] - Round-scoped bounded task set with a collection deadline
//! - [`ConcurrencyDriver`] - Fans a round out to `width` workers and aggregates it
//! - [`strategy`] - Stress, sustained, peak, stability, capacity and safety drivers
//! - [`EngineMetrics`] - Optional Prometheus counters fed by the driver
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use volley_loadtest::prelude::*;
//!
//! # async fn run() -> volley_core::Result<()> {
//! let executor = Arc::new(HttpExecutor::new(Duration::from_secs(30))?);
//! let driver = ConcurrencyDriver::new(executor, DriverSettings::default());
//! let request = RequestSpec::get("http://localhost:8080/health");
//!
//! let round = driver.run_round(&request, 10, Duration::from_millis(1000)).await?;
//! println!("{}", round);
//!
//! let trace = run_stress_test(&driver, &request, &StressPlan::default()).await?;
//! println!("{}", trace);
//! # Ok(())
//! # }
//! ```

pub mod driver;
pub mod executor;
pub mod interrupt;
pub mod metrics;
pub mod pool;
pub mod profile;
pub mod report;
pub mod strategy;
pub mod testing;

pub use driver::ConcurrencyDriver;
pub use executor::{is_valid_url, HttpExecutor, RequestExecutor};
pub use interrupt::{interrupt_channel, InterruptSignal, Interrupter, Pause};
pub use metrics::EngineMetrics;
pub use pool::{Collected, WorkerPool};
pub use profile::Profile;
pub use strategy::*;

pub mod prelude {
    pub use crate::driver::ConcurrencyDriver;
    pub use crate::executor::{HttpExecutor, RequestExecutor};
    pub use crate::interrupt::{interrupt_channel, InterruptSignal, Interrupter};
    pub use crate::strategy::*;
    pub use volley_core::prelude::*;
    pub use volley_core::{
        CapacityPlan, DriverSettings, PeakPlan, SafetyPlan, StabilityPlan, StressPlan, SustainedPlan,
    };
}
