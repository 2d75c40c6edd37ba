//! Error types for Volley

use thiserror::Error;

/// Result type alias for Volley operations
pub type Result<T> = std::result::Result<T, VolleyError>;

/// Errors that can escape the engine.
///
/// Request failures never show up here: they are folded into round
/// statistics. What remains are configuration problems and failures of the
/// surrounding tooling (files, serialization, HTTP client setup, metrics).
#[derive(Error, Debug)]
pub enum VolleyError {
    // === Configuration ===
    /// A plan or setting is outside its valid range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A worker pool could not be created
    #[error("Cannot create worker pool of size {size}: {reason}")]
    PoolCreation { size: usize, reason: String },

    // === Collaborators ===
    /// The request executor failed outside of a normal HTTP round-trip
    #[error("Request execution failed: {0}")]
    Execution(String),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(String),

    // === Tooling ===
    /// Profile file could not be parsed
    #[error("Profile parse error: {0}")]
    Profile(#[from] toml::de::Error),

    /// Result could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VolleyError {
    /// Shorthand for an [`VolleyError::InvalidConfig`] error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether the error stems from caller-supplied configuration rather
    /// than from the environment the test ran in
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_) | Self::PoolCreation { .. } | Self::Profile(_)
        )
    }
}
