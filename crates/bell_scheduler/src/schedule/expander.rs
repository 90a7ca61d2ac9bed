//! Expansion of a compact schedule description into dated alarms.

use super::types::{AlarmEvent, ScheduleDescription};
use chrono::{Days, NaiveDate};
use tracing::debug;

/// How far past today alarms are expanded by default.
pub const DEFAULT_HORIZON_DAYS: u32 = 180;

/// Expands every course period into concrete alarms between `today` and
/// `today + horizon_days` (inclusive), sorted by date then time.
///
/// Pure: the same description, `today` and horizon always give the same
/// output. Alarms sharing a date and time keep snapshot order, so duplicates
/// from overlapping periods stay adjacent and in a stable order.
pub fn expand(
    description: &ScheduleDescription,
    today: NaiveDate,
    horizon_days: u32,
) -> Vec<AlarmEvent> {
    let last_day = today
        .checked_add_days(Days::new(horizon_days.into()))
        .unwrap_or(NaiveDate::MAX);
    let mut alarms = Vec::new();

    for period in &description.periods {
        let length = description.period_length(period);
        if length == 0 {
            debug!(
                "Skipping course period {} starting {}: no days",
                period.course_type, period.start_date
            );
            continue;
        }

        for day in 0..length {
            let Some(date) = period.start_date.checked_add_days(Days::new(day.into())) else {
                break;
            };
            if date > last_day {
                break;
            }
            // Past days can never fire
            if date < today {
                continue;
            }
            let Some(pattern_key) = description.pattern_key(&period.course_type, day as usize)
            else {
                continue;
            };

            for bell in description.bells(&period.course_type, pattern_key) {
                alarms.push(AlarmEvent {
                    date,
                    time: bell.time,
                    bell_type: bell.bell_type.clone(),
                    strike_count: description.resolve_strikes(bell),
                    course_type: period.course_type.clone(),
                    pattern_key: pattern_key.clone(),
                });
            }
        }
    }

    alarms.sort_by_key(AlarmEvent::key);
    alarms
}
