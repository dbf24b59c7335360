//! Core error types for Chronoscope.
//!
//! Errors raised by instrumented code travel as [`Thrown`](crate::Thrown)
//! values and are never converted into these types. The enums here only
//! cover the profiler's own infrastructure.

use thiserror::Error;

/// Errors while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration is well-formed but not usable.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// IO error reading a configuration file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
