//! Alarm firing: the minute ticker, its shared state, the clock it reads and
//! the events it publishes.

mod clock;
mod events;
mod state;
mod ticker;

pub use clock::{Clock, SystemClock};
#[cfg(test)]
pub use clock::FixedClock;
pub use events::{EngineEvent, EventBus, FireOrigin};
pub use state::{SchedulerState, TickMarkers};
pub use ticker::{
    DayRollover, TickOutcome, Ticker, TickerConfig, TickerState, DEFAULT_FIRE_WINDOW_SECS,
    DEFAULT_POLL_INTERVAL,
};
