use thiserror::Error;

/// Failures surfaced while building a pool or reading its configuration.
///
/// Steady-state operations never return these; only construction does.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoolError {
    #[error("Invalid requests per second: {0} (must be a finite value greater than zero)")]
    InvalidRate(f64),

    #[error("Invalid {field}: must be greater than zero")]
    InvalidLimit { field: &'static str },

    #[error("Malformed credential at position {position}")]
    MalformedCredential { position: usize },

    #[error("Invalid setting {key}={value}")]
    InvalidSetting { key: String, value: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}
