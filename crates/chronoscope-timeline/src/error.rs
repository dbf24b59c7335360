//! Error types for the timeline and reports.

use thiserror::Error;

/// Errors from a timeline store.
#[derive(Debug, Error)]
pub enum TimelineError {
    /// A measure referenced a mark that was never recorded.
    #[error("Unknown mark: '{0}'")]
    UnknownMark(String),

    /// The store refused a measurement because it is full.
    #[error("Timeline full: capacity of {capacity} measurements reached")]
    CapacityExceeded {
        /// The configured capacity.
        capacity: usize,
    },
}

/// Errors while loading or rendering reports.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Measurement JSON could not be parsed or written.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error reading or writing a report.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A measurement carried an invalid time value.
    #[error("Invalid time value for '{name}': {value}")]
    InvalidTime {
        /// Name of the offending measurement.
        name: String,
        /// The rejected value in milliseconds.
        value: f64,
    },
}

/// Result type alias for timeline operations.
pub type TimelineResult<T> = std::result::Result<T, TimelineError>;

/// Result type alias for report operations.
pub type ReportResult<T> = std::result::Result<T, ReportError>;
