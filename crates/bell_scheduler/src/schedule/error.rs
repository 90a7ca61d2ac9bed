//! Error types for schedule parsing and expansion.

use thiserror::Error;

/// Problems found while validating a raw schedule snapshot.
///
/// Per-entry and per-period variants are never fatal: the offending item is
/// quarantined and the rest of the snapshot is still used.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// A single bell or period entry is missing required fields or has the wrong shape
    #[error("Malformed schedule entry at {location}: {reason}")]
    MalformedScheduleEntry { location: String, reason: String },

    /// A course period's start date is not a `YYYY-MM-DD` calendar date
    #[error("Unparseable start date {value:?} for course period {index}")]
    UnparseableDate { index: usize, value: String },

    /// The snapshot as a whole could not be decoded
    #[error("Invalid schedule description: {message}")]
    InvalidDescription { message: String },
}

impl From<serde_json::Error> for ScheduleError {
    fn from(err: serde_json::Error) -> Self {
        ScheduleError::InvalidDescription {
            message: err.to_string(),
        }
    }
}
