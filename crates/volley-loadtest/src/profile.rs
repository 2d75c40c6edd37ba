//! Test profiles
//!
//! A profile is a TOML file holding the request to fire and any subset of
//! the driver settings and strategy plans; missing tables fall back to
//! their defaults. Only the CLI reads profiles; the engine takes plain
//! values.
//!
//! ```toml
//! [request]
//! url = "http://localhost:8080/api/orders"
//! method = "POST"
//!
//! [request.headers]
//! Authorization = "Bearer token"
//!
//! [request.params]
//! sku = "A-100"
//! quantity = 2
//!
//! [driver]
//! verbose = true
//!
//! [stress]
//! max_width = 300
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use volley_core::{
    CapacityPlan, DriverSettings, PeakPlan, RequestSpec, Result, SafetyPlan, StabilityPlan, StressPlan,
    SustainedPlan, VolleyError,
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Target request; the CLI's `--target` may supply or override it
    #[serde(default)]
    pub request: Option<RequestSpec>,

    #[serde(default)]
    pub driver: DriverSettings,

    #[serde(default)]
    pub stress: StressPlan,

    #[serde(default)]
    pub sustained: SustainedPlan,

    #[serde(default)]
    pub peak: PeakPlan,

    #[serde(default)]
    pub stability: StabilityPlan,

    #[serde(default)]
    pub capacity: CapacityPlan,

    #[serde(default)]
    pub safety: SafetyPlan,
}

impl Profile {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a profile from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check every plan, naming the offending table
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("stress", self.stress.validate()),
            ("sustained", self.sustained.validate()),
            ("peak", self.peak.validate()),
            ("stability", self.stability.validate()),
            ("capacity", self.capacity.validate()),
            ("safety", self.safety.validate()),
        ];
        for (table, check) in checks {
            match check {
                Err(VolleyError::InvalidConfig(msg)) => {
                    return Err(VolleyError::config(format!("[{}] {}", table, msg)));
                }
                Err(e) => return Err(e),
                Ok(()) => {}
            }
        }
        Ok(())
    }
}
