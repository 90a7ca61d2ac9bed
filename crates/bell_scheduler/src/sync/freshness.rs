//! Decides whether the locally cached schedule is stale.

use super::{ScheduleSource, SyncError};
use crate::schedule::FreshnessMarker;
use crate::storage::{DurableStore, StorageError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a freshness check could not reach a verdict.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FreshnessError {
    #[error("Probe failed: {0}")]
    Probe(#[from] SyncError),

    #[error("Local marker unavailable: {0}")]
    Storage(#[from] StorageError),
}

/// Result of one freshness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshnessReport {
    pub needs_update: bool,
    pub server_marker: Option<FreshnessMarker>,
    pub local_marker: Option<FreshnessMarker>,
    pub error: Option<FreshnessError>,
}

impl FreshnessReport {
    fn failed(local_marker: Option<FreshnessMarker>, error: FreshnessError) -> Self {
        Self {
            needs_update: false,
            server_marker: None,
            local_marker,
            error: Some(error),
        }
    }
}

/// Compares the server's freshness marker against the one stored with the
/// local copy.
pub struct FreshnessChecker {
    source: Arc<dyn ScheduleSource>,
    store: Arc<dyn DurableStore>,
}

impl FreshnessChecker {
    pub fn new(source: Arc<dyn ScheduleSource>, store: Arc<dyn DurableStore>) -> Self {
        Self { source, store }
    }

    /// Probes the server and reports whether a full refetch is needed.
    ///
    /// Never fails: any probe or storage error yields `needs_update: false`
    /// with the error attached, so an unreachable server never triggers a
    /// refetch.
    pub async fn check(&self) -> FreshnessReport {
        let local_marker = match self.store.load_marker() {
            Ok(marker) => marker,
            Err(e) => {
                warn!(error = %e, "Could not read local freshness marker");
                return FreshnessReport::failed(None, e.into());
            }
        };

        let probe = match self.source.probe().await {
            Ok(probe) => probe,
            Err(e) => {
                warn!(error = %e, "Freshness probe failed");
                return FreshnessReport::failed(local_marker, e.into());
            }
        };

        let server_marker = probe.marker();
        let needs_update = match (&server_marker, &local_marker) {
            (Some(server), Some(local)) => server != local,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if needs_update {
            info!(
                server = ?server_marker,
                local = ?local_marker,
                "Schedule data changed on server"
            );
        } else {
            debug!(marker = ?local_marker, "Schedule data is current");
        }

        FreshnessReport {
            needs_update,
            server_marker,
            local_marker,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::RawScheduleDescription;
    use crate::storage::{CachedSchedule, SqliteStore};
    use crate::sync::testing::StaticSource;
    use crate::sync::{ProbeResponse, SyncError};
    use chrono::Utc;

    fn store_with_marker(marker: Option<&str>) -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        if let Some(marker) = marker {
            store
                .save(&CachedSchedule {
                    description: RawScheduleDescription::default(),
                    marker: Some(FreshnessMarker::new(marker)),
                    saved_at: Utc::now(),
                })
                .unwrap();
        }
        store
    }

    async fn check(server: Option<&str>, local: Option<&str>) -> FreshnessReport {
        let source = Arc::new(StaticSource::new());
        source.set_probe(Ok(ProbeResponse::ok(server)));
        FreshnessChecker::new(source, store_with_marker(local))
            .check()
            .await
    }

    #[tokio::test]
    async fn test_matching_markers_need_no_update() {
        let report = check(Some("m1"), Some("m1")).await;
        assert!(!report.needs_update);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn test_changed_marker_needs_update() {
        let report = check(Some("m2"), Some("m1")).await;
        assert!(report.needs_update);
        assert_eq!(report.server_marker, Some(FreshnessMarker::new("m2")));
        assert_eq!(report.local_marker, Some(FreshnessMarker::new("m1")));
    }

    #[tokio::test]
    async fn test_missing_local_marker_needs_update() {
        assert!(check(Some("m1"), None).await.needs_update);
    }

    #[tokio::test]
    async fn test_missing_server_marker_is_not_an_update() {
        assert!(!check(None, Some("m1")).await.needs_update);
        assert!(!check(None, None).await.needs_update);
    }

    #[tokio::test]
    async fn test_probe_failure_reports_error_without_update() {
        let source = Arc::new(StaticSource::new());
        source.set_probe(Err(SyncError::NetworkUnavailable {
            message: "offline".to_string(),
        }));
        let checker = FreshnessChecker::new(source, store_with_marker(Some("m1")));

        let report = checker.check().await;

        assert!(!report.needs_update);
        assert_eq!(report.local_marker, Some(FreshnessMarker::new("m1")));
        assert!(matches!(
            report.error,
            Some(FreshnessError::Probe(SyncError::NetworkUnavailable { .. }))
        ));
    }
}
