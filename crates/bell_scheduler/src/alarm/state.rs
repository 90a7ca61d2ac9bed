//! Mutable engine state shared by the service and the ticker.

use crate::schedule::{AlarmKey, AlarmStore};
use chrono::NaiveDate;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Dedup markers the ticker consults on every tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickMarkers {
    /// Last instant a bell was fired for
    pub last_fired: Option<AlarmKey>,
    /// Last date the midnight maintenance ran for
    pub last_maintenance: Option<NaiveDate>,
}

/// The alarm store plus the ticker's markers.
#[derive(Debug, Default)]
pub struct SchedulerState {
    pub alarms: AlarmStore,
    markers: Mutex<TickMarkers>,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn markers(&self) -> MutexGuard<'_, TickMarkers> {
        self.markers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
