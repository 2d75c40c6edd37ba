//! Strategy drivers
//!
//! Each strategy composes [`ConcurrencyDriver`](crate::driver::ConcurrencyDriver)
//! rounds with a control loop and a stopping policy. Plans are validated
//! before the first round; past that point nothing a target does makes a
//! strategy return an error. Inter-round pauses observe the driver's
//! interrupt signal.

pub mod capacity;
pub mod peak;
pub mod safety;
pub mod stability;
pub mod stress;
pub mod sustained;

pub use capacity::run_capacity_test;
pub use peak::run_peak_load_test;
pub use safety::run_concurrency_safety_test;
pub use stability::run_stability_test;
pub use stress::run_stress_test;
pub use sustained::run_sustained_load_test;
