//! Drift-tolerant minute ticker.
//!
//! The ticker polls the clock every `poll_interval` (one second by default)
//! and only acts during the first `fire_window_secs` of each minute. A coarse
//! or drifting timer therefore still lands inside every minute's window, and
//! the "last fired" marker keeps repeated polls in one minute from firing
//! twice.
//!
//! ```text
//!   start()            every poll            stop()
//!  Idle ──────► Armed ◄──────────► (tick) ──────────► Stopped
//!                 ▲                                      │
//!                 └────────────── start() ───────────────┘
//! ```

use super::clock::Clock;
use super::events::{EngineEvent, EventBus, FireOrigin};
use super::state::SchedulerState;
use crate::schedule::{AlarmEvent, AlarmKey, TimeOfDay};
use chrono::{NaiveDate, Timelike};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Default polling period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of seconds at the top of each minute during which a tick may act.
pub const DEFAULT_FIRE_WINDOW_SECS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerConfig {
    pub poll_interval: Duration,
    /// Ticks later than this many seconds into the minute do nothing
    pub fire_window_secs: u32,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            fire_window_secs: DEFAULT_FIRE_WINDOW_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TickerState {
    Idle,
    Armed,
    Stopped,
}

/// Re-expands the schedule when midnight maintenance starts a new day.
///
/// Expansion only covers a bounded window ahead of today, so without this the
/// store would run dry once the window is used up.
pub trait DayRollover: Send + Sync {
    /// Rebuilds the alarm store for `today`. Returns the new alarm count, or
    /// `None` if there was nothing to expand.
    fn roll_over(&self, today: NaiveDate) -> Option<usize>;
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// The alarm that was fired, if any
    pub fired: Option<AlarmEvent>,
    /// Number of past alarms pruned, if midnight maintenance ran
    pub pruned: Option<usize>,
}

struct TickCore {
    state: Arc<SchedulerState>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    config: TickerConfig,
    rollover: Option<Arc<dyn DayRollover>>,
}

impl TickCore {
    fn tick(&self) -> TickOutcome {
        let now = self.clock.now();
        let second = now.second();
        if second > self.config.fire_window_secs {
            return TickOutcome::default();
        }

        let date = now.date();
        let time = TimeOfDay::of(&now);
        let key = AlarmKey { date, time };
        let mut outcome = TickOutcome::default();
        let mut markers = self.state.markers();

        if second <= 1 {
            debug!(
                "[tick] now={} (sec={}), has_match={}",
                key,
                second,
                self.state.alarms.find_at(date, time).is_some()
            );
        }

        // Fire check runs before maintenance
        if markers.last_fired != Some(key) {
            if let Some(alarm) = self.state.alarms.find_at(date, time) {
                markers.last_fired = Some(key);
                let strike_count = alarm.strike_count.max(1);
                info!(
                    "Auto-firing bell for {} ({} strikes, course {})",
                    key, strike_count, alarm.course_type
                );
                self.events.emit(EngineEvent::Fire {
                    strike_count,
                    origin: FireOrigin::Auto,
                });
                outcome.fired = Some(alarm);
            }
        }

        if time.is_midnight() && markers.last_maintenance != Some(date) {
            markers.last_maintenance = Some(date);
            let removed = self.state.alarms.prune_before(date);
            if removed > 0 {
                info!("Deleted {} past alarms", removed);
            }
            if let Some(rollover) = &self.rollover {
                if let Some(count) = rollover.roll_over(date) {
                    debug!("[midnight] re-expanded schedule ({} alarms)", count);
                }
            }
            debug!("[midnight] maintenance done for {}", date);
            self.events.emit(EngineEvent::ScheduleChanged {
                alarm_count: self.state.alarms.len(),
            });
            outcome.pruned = Some(removed);
        }

        outcome
    }
}

/// Polls the alarm store and fires each matching minute exactly once.
pub struct Ticker {
    core: Arc<TickCore>,
    handle: Option<JoinHandle<()>>,
    state: TickerState,
}

impl Ticker {
    pub fn new(
        state: Arc<SchedulerState>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        config: TickerConfig,
    ) -> Self {
        Self {
            core: Arc::new(TickCore {
                state,
                clock,
                events,
                config,
                rollover: None,
            }),
            handle: None,
            state: TickerState::Idle,
        }
    }

    /// Has midnight maintenance hand the new date to `rollover`.
    pub fn with_rollover(mut self, rollover: Arc<dyn DayRollover>) -> Self {
        self.core = Arc::new(TickCore {
            state: Arc::clone(&self.core.state),
            clock: Arc::clone(&self.core.clock),
            events: self.core.events.clone(),
            config: self.core.config.clone(),
            rollover: Some(rollover),
        });
        self
    }

    /// Runs one poll synchronously. Used by the background loop and by tests.
    pub fn tick(&self) -> TickOutcome {
        self.core.tick()
    }

    /// Arms the polling loop. Any previous loop is cancelled first so two
    /// loops can never run at once.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }

        let core = Arc::clone(&self.core);
        let period = core.config.poll_interval;
        self.handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                core.tick();
            }
        }));
        self.state = TickerState::Armed;

        info!(
            "Minute ticker started ({}ms interval, 0-{}s window)",
            period.as_millis(),
            self.core.config.fire_window_secs
        );
    }

    /// Cancels the polling loop. Stopping an already stopped ticker does nothing.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            info!("Minute ticker stopped");
        }
        if self.state == TickerState::Armed {
            self.state = TickerState::Stopped;
        }
    }

    /// Stops the current loop and starts a new one with `config`.
    pub fn restart(&mut self, config: TickerConfig) {
        self.stop();
        self.core = Arc::new(TickCore {
            state: Arc::clone(&self.core.state),
            clock: Arc::clone(&self.core.clock),
            events: self.core.events.clone(),
            config,
            rollover: self.core.rollover.clone(),
        });
        self.start();
    }

    pub fn state(&self) -> TickerState {
        self.state
    }

    pub fn config(&self) -> &TickerConfig {
        &self.core.config
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
