//! Bell schedule snapshots, their expansion into dated alarms, and the
//! in-memory alarm store the ticker reads from.

mod error;
mod expander;
mod store;
mod types;
mod view;

pub use error::ScheduleError;
pub use expander::{expand, DEFAULT_HORIZON_DAYS};
pub use store::AlarmStore;
pub use types::*;
pub use view::{build_view, DaySchedule, ScheduleView, DEFAULT_DISPLAY_DAYS};

use chrono::NaiveDate;
use tracing::{info, warn};

/// Validates a raw snapshot and expands it, logging anything quarantined.
///
/// Entry-level problems never fail the expansion as a whole.
pub fn expand_raw(
    raw: &RawScheduleDescription,
    today: NaiveDate,
    horizon_days: u32,
) -> Vec<AlarmEvent> {
    let Parsed {
        description,
        quarantined,
    } = ScheduleDescription::from_raw(raw);

    if !quarantined.is_empty() {
        warn!(
            "Skipped {} malformed schedule entries (first: {})",
            quarantined.len(),
            quarantined[0]
        );
    }

    let alarms = expand(&description, today, horizon_days);
    info!(
        "Expanded {} course periods into {} alarms",
        description.periods.len(),
        alarms.len()
    );
    alarms
}
