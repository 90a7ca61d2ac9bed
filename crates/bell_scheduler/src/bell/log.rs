use crate::alarm::FireOrigin;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Entries kept before the oldest is dropped.
pub const BELL_LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BellLogEntry {
    pub played_at: DateTime<Local>,
    pub origin: FireOrigin,
    pub strike_count: u32,
}

/// Bounded record of played strike sequences, newest first.
#[derive(Debug)]
pub struct BellLog {
    entries: Mutex<VecDeque<BellLogEntry>>,
    capacity: usize,
}

impl BellLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record(&self, entry: BellLogEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    pub fn entries(&self) -> Vec<BellLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl Default for BellLog {
    fn default() -> Self {
        Self::new(BELL_LOG_CAPACITY)
    }
}
