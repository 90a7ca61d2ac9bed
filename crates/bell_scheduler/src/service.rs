//! Coordinates fetching, caching and expanding the schedule.
//!
//! `BellService` owns the [`SchedulerState`] the ticker reads from and is the
//! only writer of the alarm store apart from the ticker's midnight prune. It
//! also keeps the last applied snapshot so each new day can be re-expanded
//! without touching the network.

use crate::alarm::{
    Clock, DayRollover, EngineEvent, EventBus, FireOrigin, SchedulerState, Ticker, TickerConfig,
};
use crate::schedule::{build_view, expand_raw, FreshnessMarker, RawScheduleDescription, ScheduleView};
use crate::storage::{CachedSchedule, DurableStore};
use crate::sync::{FreshnessChecker, FreshnessError, FreshnessReport, ScheduleSource, SyncError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Where the alarms currently in use came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DataStatus {
    /// No schedule has ever been stored
    FirstUse,
    /// Running on the stored copy; the server was not reached
    Offline,
    /// The schedule matches the server
    Online,
    /// The server answered but its response was unusable
    Abnormal,
}

/// Result of a manual sync.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SyncOutcome {
    /// Fetched, stored and applied a fresh schedule
    #[serde(rename_all = "camelCase")]
    Updated { alarm_count: usize },
    /// The fetch failed; alarms come from the stored copy
    #[serde(rename_all = "camelCase")]
    UsingCached { alarm_count: usize, error: String },
    /// The fetch failed and nothing is stored
    NoLocalData { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub data_status: DataStatus,
    pub alarm_count: usize,
    pub local_marker: Option<FreshnessMarker>,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_check: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub horizon_days: u32,
    pub display_days: u32,
    /// Strikes for a manual play with no explicit count
    pub manual_strike_count: u32,
    pub freshness_interval: Duration,
    pub startup_check_delay: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            horizon_days: crate::schedule::DEFAULT_HORIZON_DAYS,
            display_days: crate::schedule::DEFAULT_DISPLAY_DAYS,
            manual_strike_count: 4,
            freshness_interval: Duration::from_secs(300),
            startup_check_delay: Duration::from_secs(2),
        }
    }
}

pub struct BellService {
    config: ServiceConfig,
    state: Arc<SchedulerState>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    source: Arc<dyn ScheduleSource>,
    store: Arc<dyn DurableStore>,
    freshness: FreshnessChecker,
    status: RwLock<ServiceStatus>,
    /// Last snapshot handed to `apply`
    current: RwLock<Option<Arc<RawScheduleDescription>>>,
    /// Serializes background and manual syncs
    sync_lock: Mutex<()>,
}

impl BellService {
    pub fn new(
        config: ServiceConfig,
        clock: Arc<dyn Clock>,
        events: EventBus,
        source: Arc<dyn ScheduleSource>,
        store: Arc<dyn DurableStore>,
    ) -> Self {
        Self {
            config,
            state: Arc::new(SchedulerState::new()),
            clock,
            events,
            freshness: FreshnessChecker::new(Arc::clone(&source), Arc::clone(&store)),
            source,
            store,
            status: RwLock::new(ServiceStatus {
                data_status: DataStatus::FirstUse,
                alarm_count: 0,
                local_marker: None,
                last_sync: None,
                last_check: None,
                last_error: None,
            }),
            current: RwLock::new(None),
            sync_lock: Mutex::new(()),
        }
    }

    /// A ticker over this service's alarm store. Its midnight maintenance
    /// re-expands the current snapshot for the new day.
    pub fn ticker(self: &Arc<Self>, config: TickerConfig) -> Ticker {
        Ticker::new(
            Arc::clone(&self.state),
            Arc::clone(&self.clock),
            self.events.clone(),
            config,
        )
        .with_rollover(Arc::clone(self) as Arc<dyn DayRollover>)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn state(&self) -> &Arc<SchedulerState> {
        &self.state
    }

    /// Loads the stored schedule, if any, before any network access.
    pub fn bootstrap(&self) -> DataStatus {
        match self.store.load() {
            Ok(Some(cached)) => {
                let count = self.apply(&cached.description);
                info!(
                    "Loaded stored schedule saved at {} ({} alarms)",
                    cached.saved_at, count
                );
                self.update_status(|status| {
                    status.data_status = DataStatus::Offline;
                    status.local_marker = cached.marker.clone();
                    status.last_sync = Some(cached.saved_at);
                })
            }
            Ok(None) => {
                info!("No stored schedule, waiting for first sync");
                self.update_status(|status| status.data_status = DataStatus::FirstUse)
            }
            Err(e) => {
                error!(error = %e, "Failed to load stored schedule");
                self.update_status(|status| {
                    status.data_status = DataStatus::FirstUse;
                    status.last_error = Some(e.to_string());
                })
            }
        }
    }

    /// Expands `raw` for today and swaps it into the alarm store.
    ///
    /// Applying the same snapshot twice on the same day leaves the store
    /// unchanged.
    pub fn apply(&self, raw: &RawScheduleDescription) -> usize {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::new(raw.clone()));
        let count = self.expand_for(raw, self.clock.today());
        self.events
            .emit(EngineEvent::ScheduleChanged { alarm_count: count });
        count
    }

    fn expand_for(&self, raw: &RawScheduleDescription, today: NaiveDate) -> usize {
        let alarms = expand_raw(raw, today, self.config.horizon_days);
        let count = alarms.len();
        self.state.alarms.replace_all(alarms);
        self.update_status(|status| status.alarm_count = count);
        count
    }

    /// Runs a freshness check and refetches if the server has newer data.
    pub async fn refresh_if_stale(&self) -> FreshnessReport {
        let _guard = self.sync_lock.lock().await;
        let report = self.freshness.check().await;
        let checked_at = Utc::now();

        if let Some(e) = &report.error {
            let data_status = match e {
                FreshnessError::Probe(e) => self.status_after_failure(e),
                FreshnessError::Storage(_) => DataStatus::Abnormal,
            };
            self.update_status(|status| {
                status.data_status = data_status;
                status.last_check = Some(checked_at);
                status.last_error = Some(e.to_string());
            });
            return report;
        }

        if !report.needs_update {
            self.update_status(|status| {
                status.last_check = Some(checked_at);
                if status.data_status != DataStatus::FirstUse {
                    status.data_status = DataStatus::Online;
                }
            });
            return report;
        }

        if let Err(e) = self.fetch_and_apply().await {
            warn!(error = %e, "Background refresh failed, keeping current alarms");
            let data_status = self.status_after_failure(&e);
            self.update_status(|status| {
                status.data_status = data_status;
                status.last_error = Some(e.to_string());
            });
        }
        self.update_status(|status| status.last_check = Some(checked_at));
        report
    }

    /// Fetches the schedule now, falling back to the stored copy.
    pub async fn sync_now(&self) -> SyncOutcome {
        let _guard = self.sync_lock.lock().await;
        info!("Manual sync requested");

        let err = match self.fetch_and_apply().await {
            Ok(alarm_count) => return SyncOutcome::Updated { alarm_count },
            Err(e) => e,
        };
        warn!(error = %err, "Sync failed, falling back to stored schedule");

        match self.store.load() {
            Ok(Some(cached)) => {
                let alarm_count = self.apply(&cached.description);
                let data_status = self.status_after_failure(&err);
                self.update_status(|status| {
                    status.data_status = data_status;
                    status.local_marker = cached.marker.clone();
                    status.last_error = Some(err.to_string());
                });
                SyncOutcome::UsingCached {
                    alarm_count,
                    error: err.to_string(),
                }
            }
            Ok(None) => {
                self.update_status(|status| {
                    status.data_status = DataStatus::FirstUse;
                    status.last_error = Some(err.to_string());
                });
                SyncOutcome::NoLocalData {
                    error: err.to_string(),
                }
            }
            Err(storage_err) => {
                error!(error = %storage_err, "Stored schedule unreadable");
                self.update_status(|status| {
                    status.data_status = DataStatus::Abnormal;
                    status.last_error = Some(storage_err.to_string());
                });
                SyncOutcome::NoLocalData {
                    error: err.to_string(),
                }
            }
        }
    }

    /// Fetches, stores and applies the schedule.
    ///
    /// The stored marker is the snapshot's own `generatedAt`. The source may
    /// answer from its response cache, and an older body must never be
    /// recorded under the server's newer marker.
    async fn fetch_and_apply(&self) -> Result<usize, SyncError> {
        let raw = self.source.fetch_schedule().await?;
        let marker = raw.marker();
        let synced_at = Utc::now();

        let saved = self.store.save(&CachedSchedule {
            description: raw.clone(),
            marker: marker.clone(),
            saved_at: synced_at,
        });
        if let Err(e) = &saved {
            error!(error = %e, "Failed to store fetched schedule");
        }

        let count = self.apply(&raw);
        self.update_status(|status| {
            status.data_status = DataStatus::Online;
            status.last_sync = Some(synced_at);
            match &saved {
                Ok(()) => {
                    status.local_marker = marker.clone();
                    status.last_error = None;
                }
                // The marker on disk is still the old one
                Err(e) => status.last_error = Some(e.to_string()),
            }
        });
        info!(marker = ?marker, alarms = count, "Schedule synced");
        Ok(count)
    }

    fn status_after_failure(&self, err: &SyncError) -> DataStatus {
        match err {
            SyncError::NetworkUnavailable { .. } | SyncError::HttpStatus { .. } => {
                if self.store.has_data() {
                    DataStatus::Offline
                } else {
                    DataStatus::FirstUse
                }
            }
            _ => DataStatus::Abnormal,
        }
    }

    /// Rings the bell by hand. `None` uses the configured manual count.
    pub fn play_manual(&self, strike_count: Option<u32>) -> u32 {
        let strike_count = strike_count
            .filter(|&n| n > 0)
            .unwrap_or(self.config.manual_strike_count);
        info!("Manual play requested ({} strikes)", strike_count);
        self.events.emit(EngineEvent::Fire {
            strike_count,
            origin: FireOrigin::Manual,
        });
        strike_count
    }

    pub fn stop_bell(&self) {
        self.events.emit(EngineEvent::Stop);
    }

    pub fn status(&self) -> ServiceStatus {
        let mut status = self
            .status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        // The ticker prunes at midnight without going through the service
        status.alarm_count = self.state.alarms.len();
        status
    }

    pub fn schedule_view(&self, show_all: bool) -> ScheduleView {
        build_view(
            &self.state.alarms.snapshot(),
            self.clock.today(),
            self.config.display_days,
            show_all,
        )
    }

    /// Periodic freshness checks: once after the startup delay, then every
    /// `freshness_interval`. Runs until the task is dropped.
    pub async fn run_freshness_loop(self: Arc<Self>) {
        tokio::time::sleep(self.config.startup_check_delay).await;
        debug!("Running startup freshness check");
        self.refresh_if_stale().await;

        let mut interval = tokio::time::interval(self.config.freshness_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.refresh_if_stale().await;
        }
    }

    /// Applies `f` and publishes a status event if the data status changed.
    fn update_status(&self, f: impl FnOnce(&mut ServiceStatus)) -> DataStatus {
        let (before, after) = {
            let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
            let before = status.data_status;
            f(&mut status);
            (before, status.data_status)
        };
        if before != after {
            info!("Data status changed: {:?} -> {:?}", before, after);
            self.events
                .emit(EngineEvent::StatusChanged { status: after });
        }
        after
    }
}

impl DayRollover for BellService {
    fn roll_over(&self, today: NaiveDate) -> Option<usize> {
        let current = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        let count = self.expand_for(&current, today);
        info!("Re-expanded schedule for {} ({} alarms)", today, count);
        Some(count)
    }
}
