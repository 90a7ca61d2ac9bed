//! Remote schedule access and freshness checking.

mod cache;
mod client;
mod error;
mod freshness;
#[cfg(test)]
pub mod testing;

pub use cache::{RequestKey, ResponseCache, DEFAULT_RESPONSE_TTL};
pub use client::{ClientConfig, HttpScheduleSource};
pub use error::SyncError;
pub use freshness::{FreshnessChecker, FreshnessError, FreshnessReport};

use crate::schedule::{FreshnessMarker, RawScheduleDescription};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// Body of a keep-alive response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub status: String,
    #[serde(rename = "lastDataChange", default)]
    pub last_data_change: Option<String>,
}

impl ProbeResponse {
    pub fn ok(last_data_change: Option<&str>) -> Self {
        Self {
            status: "OK".to_string(),
            last_data_change: last_data_change.map(str::to_string),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }

    /// The server's current marker, if it reported a non-empty one.
    pub fn marker(&self) -> Option<FreshnessMarker> {
        self.last_data_change
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(FreshnessMarker::new)
    }
}

/// Where schedule snapshots and freshness markers come from.
pub trait ScheduleSource: Send + Sync {
    /// Fetches the full schedule snapshot.
    fn fetch_schedule(&self) -> BoxFuture<'_, Result<RawScheduleDescription, SyncError>>;

    /// Cheap liveness check that also reports the server's freshness marker.
    fn probe(&self) -> BoxFuture<'_, Result<ProbeResponse, SyncError>>;
}
