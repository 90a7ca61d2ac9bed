//! Wall-clock access, injectable for tests.

use chrono::{Local, NaiveDate, NaiveDateTime};

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// The host's local time zone clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to.
#[cfg(test)]
#[derive(Debug)]
pub struct FixedClock {
    now: std::sync::Mutex<NaiveDateTime>,
}

#[cfg(test)]
impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    /// Builds a clock from `YYYY-MM-DD HH:MM:SS`.
    pub fn at(value: &str) -> Self {
        Self::new(NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").unwrap())
    }

    pub fn set(&self, value: &str) {
        *self.now.lock().unwrap() =
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").unwrap();
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap()
    }
}
