//! In-memory store of expanded alarms.

use super::types::{AlarmEvent, AlarmKey, TimeOfDay};
use chrono::NaiveDate;
use std::sync::{Arc, PoisonError, RwLock};

/// Ordered collection of alarms with whole-snapshot replacement.
///
/// Readers take a cheap `Arc` snapshot, so a lookup never observes a
/// half-replaced collection even if a replacement runs on another task.
#[derive(Debug, Default)]
pub struct AlarmStore {
    alarms: RwLock<Arc<Vec<AlarmEvent>>>,
}

impl AlarmStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically swaps in a new alarm set.
    pub fn replace_all(&self, mut events: Vec<AlarmEvent>) {
        events.sort_by_key(AlarmEvent::key);
        let next = Arc::new(events);
        *self.alarms.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Returns the first alarm scheduled at exactly this date and minute.
    pub fn find_at(&self, date: NaiveDate, time: TimeOfDay) -> Option<AlarmEvent> {
        let alarms = self.snapshot();
        let key = AlarmKey { date, time };
        let idx = alarms.partition_point(|a| a.key() < key);
        alarms.get(idx).filter(|a| a.key() == key).cloned()
    }

    /// Removes every alarm dated strictly before `cutoff` and returns how many
    /// were removed.
    pub fn prune_before(&self, cutoff: NaiveDate) -> usize {
        let mut guard = self.alarms.write().unwrap_or_else(PoisonError::into_inner);
        let idx = guard.partition_point(|a| a.date < cutoff);
        if idx == 0 {
            return 0;
        }
        let retained = guard[idx..].to_vec();
        *guard = Arc::new(retained);
        idx
    }

    /// Current alarms, in order.
    pub fn snapshot(&self) -> Arc<Vec<AlarmEvent>> {
        self.alarms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}
