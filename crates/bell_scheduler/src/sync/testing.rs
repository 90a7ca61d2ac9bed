//! Scripted [`ScheduleSource`] for tests.

use super::{ProbeResponse, ScheduleSource, SyncError};
use crate::schedule::RawScheduleDescription;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct StaticSource {
    schedule: Mutex<Result<RawScheduleDescription, SyncError>>,
    probe: Mutex<Result<ProbeResponse, SyncError>>,
    fetches: AtomicUsize,
    probes: AtomicUsize,
}

impl StaticSource {
    /// A source that is offline until told otherwise.
    pub fn new() -> Self {
        let offline = SyncError::NetworkUnavailable {
            message: "offline".to_string(),
        };
        Self {
            schedule: Mutex::new(Err(offline.clone())),
            probe: Mutex::new(Err(offline)),
            fetches: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn set_schedule(&self, result: Result<RawScheduleDescription, SyncError>) {
        *self.schedule.lock().unwrap() = result;
    }

    pub fn set_probe(&self, result: Result<ProbeResponse, SyncError>) {
        *self.probe.lock().unwrap() = result;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl ScheduleSource for StaticSource {
    fn fetch_schedule(&self) -> BoxFuture<'_, Result<RawScheduleDescription, SyncError>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let result = self.schedule.lock().unwrap().clone();
        Box::pin(async move { result })
    }

    fn probe(&self) -> BoxFuture<'_, Result<ProbeResponse, SyncError>> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let result = self.probe.lock().unwrap().clone();
        Box::pin(async move { result })
    }
}
