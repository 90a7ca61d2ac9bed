/// Day-by-day listing of upcoming bells for presentation layers
use super::types::{AlarmEvent, TimeOfDay};
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// How many days past today are listed unless everything is requested.
pub const DEFAULT_DISPLAY_DAYS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub is_today: bool,
    /// Distinct bell times, earliest first
    pub times: Vec<TimeOfDay>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleView {
    pub days: Vec<DaySchedule>,
    /// More days exist past the display window
    pub has_more: bool,
}

/// Groups alarms from `today` onward by date. Unless `show_all` is set, only
/// days up to `today + display_days` are listed.
pub fn build_view(
    alarms: &[AlarmEvent],
    today: NaiveDate,
    display_days: u32,
    show_all: bool,
) -> ScheduleView {
    let mut by_date: BTreeMap<NaiveDate, BTreeSet<TimeOfDay>> = BTreeMap::new();
    for alarm in alarms.iter().filter(|a| a.date >= today) {
        by_date.entry(alarm.date).or_default().insert(alarm.time);
    }

    let last_day = today
        .checked_add_days(Days::new(display_days.into()))
        .unwrap_or(NaiveDate::MAX);
    let total = by_date.len();

    let days: Vec<DaySchedule> = by_date
        .into_iter()
        .filter(|(date, _)| show_all || *date <= last_day)
        .map(|(date, times)| DaySchedule {
            date,
            is_today: date == today,
            times: times.into_iter().collect(),
        })
        .collect();

    ScheduleView {
        has_more: days.len() < total,
        days,
    }
}
