//! Error types for talking to the schedule server.

use crate::schedule::ScheduleError;
use thiserror::Error;

/// Errors that can occur while probing or fetching the remote schedule.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The request never got a response (offline, DNS, timeout, connection reset)
    #[error("Network unavailable: {message}")]
    NetworkUnavailable { message: String },

    /// The server answered with a non-success status code
    #[error("HTTP {status} from {endpoint}")]
    HttpStatus { status: u16, endpoint: String },

    /// The server answered 200 but reported an error in the body
    #[error("Server error: {message}")]
    ServerError { message: String },

    /// The response had an unexpected shape or status field
    #[error("Unexpected response: {message}")]
    UnexpectedResponse { message: String },

    /// The response body could not be decoded
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// URL parsing/construction failed
    #[error("URL error: {message}")]
    UrlError { message: String },
}

impl SyncError {
    /// Returns true if the failure is transient and the request may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::NetworkUnavailable { .. } | SyncError::HttpStatus { .. }
        )
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::Decode {
                message: err.to_string(),
            }
        } else {
            SyncError::NetworkUnavailable {
                message: err.to_string(),
            }
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::UrlError {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode {
            message: err.to_string(),
        }
    }
}

impl From<ScheduleError> for SyncError {
    fn from(err: ScheduleError) -> Self {
        SyncError::Decode {
            message: err.to_string(),
        }
    }
}
