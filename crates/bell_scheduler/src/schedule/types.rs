/// Types for bell schedule snapshots and the alarms expanded from them
use super::error::ScheduleError;
use chrono::{NaiveDate, Timelike};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

pub type CourseTypeId = String;
pub type PatternKey = String;
pub type BellTypeId = String;

/// Bell type used when an entry does not name one.
pub const DEFAULT_BELL_TYPE: &str = "1";

static DATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").unwrap());
static TIME_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{1,2}):(\d{2})$").unwrap());

/// Parses a strict, zero-padded `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let caps = DATE_REGEX.captures(value.trim())?;
    let year = caps[1].parse::<i32>().ok()?;
    let month = caps[2].parse::<u32>().ok()?;
    let day = caps[3].parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// A wall-clock minute of the day, displayed as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    /// Parses `HH:MM` (a single-digit hour is accepted and zero-padded).
    pub fn parse(value: &str) -> Option<Self> {
        let caps = TIME_REGEX.captures(value.trim())?;
        let hour = caps[1].parse::<u8>().ok()?;
        let minute = caps[2].parse::<u8>().ok()?;
        Self::new(hour, minute)
    }

    /// Truncates any chrono time value to its minute.
    pub fn of<T: Timelike>(time: &T) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn is_midnight(&self) -> bool {
        self.hour == 0 && self.minute == 0
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ScheduleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| ScheduleError::MalformedScheduleEntry {
            location: "time".to_string(),
            reason: format!("invalid time of day {value:?}"),
        })
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// Opaque server-issued token describing the last upstream data change.
///
/// Only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FreshnessMarker(String);

impl FreshnessMarker {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FreshnessMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The instant an alarm belongs to. Firing is deduplicated on this key alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AlarmKey {
    pub date: NaiveDate,
    pub time: TimeOfDay,
}

impl fmt::Display for AlarmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date.format("%Y-%m-%d"), self.time)
    }
}

/// A concrete, dated bell produced by expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub date: NaiveDate,
    pub time: TimeOfDay,
    #[serde(rename = "bellType")]
    pub bell_type: BellTypeId,
    #[serde(rename = "count")]
    pub strike_count: u32,
    #[serde(rename = "courseType")]
    pub course_type: CourseTypeId,
    #[serde(rename = "patternKey")]
    pub pattern_key: PatternKey,
}

impl AlarmEvent {
    pub fn key(&self) -> AlarmKey {
        AlarmKey {
            date: self.date,
            time: self.time,
        }
    }
}

/// Schedule snapshot exactly as the server (or the durable cache) delivers it.
///
/// Individual entries are kept as raw JSON so one bad entry cannot reject the
/// whole snapshot; validation happens in [`ScheduleDescription::from_raw`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawScheduleDescription {
    #[serde(rename = "CourseSchedule", default)]
    pub course_schedule: Vec<Value>,

    #[serde(rename = "CourseTypeDays", default)]
    pub course_type_days: BTreeMap<String, Vec<Value>>,

    #[serde(rename = "DailyPatternBells", default)]
    pub daily_pattern_bells: BTreeMap<String, BTreeMap<String, Vec<Value>>>,

    #[serde(rename = "BellConfig", default)]
    pub bell_config: BTreeMap<String, Value>,

    #[serde(rename = "generatedAt", default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
}

impl RawScheduleDescription {
    pub fn from_json(text: &str) -> Result<Self, ScheduleError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, ScheduleError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The marker the snapshot carries about itself, if any.
    pub fn marker(&self) -> Option<FreshnessMarker> {
        self.generated_at
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(FreshnessMarker::new)
    }
}

/// A dated span during which one course type's daily pattern cycle applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoursePeriod {
    pub course_type: CourseTypeId,
    pub start_date: NaiveDate,
    /// Positive length from the snapshot; `None` falls back to the pattern-day count
    pub explicit_length: Option<u32>,
}

/// One strike event inside a daily bell pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BellEntry {
    pub time: TimeOfDay,
    pub bell_type: BellTypeId,
    pub count: Option<u32>,
}

/// A validated schedule snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleDescription {
    pub periods: Vec<CoursePeriod>,
    pub pattern_days: BTreeMap<CourseTypeId, Vec<Option<PatternKey>>>,
    pub bell_patterns: BTreeMap<CourseTypeId, BTreeMap<PatternKey, Vec<BellEntry>>>,
    pub bell_config: BTreeMap<BellTypeId, u32>,
    pub marker: Option<FreshnessMarker>,
}

/// Result of validating a raw snapshot: what survived, and what was set aside.
#[derive(Debug, Clone)]
pub struct Parsed {
    pub description: ScheduleDescription,
    pub quarantined: Vec<ScheduleError>,
}

impl ScheduleDescription {
    /// Validates a raw snapshot, quarantining malformed periods and entries.
    pub fn from_raw(raw: &RawScheduleDescription) -> Parsed {
        let mut quarantined = Vec::new();

        let periods = raw
            .course_schedule
            .iter()
            .enumerate()
            .filter_map(|(index, value)| match parse_period(index, value) {
                Ok(period) => Some(period),
                Err(e) => {
                    quarantined.push(e);
                    None
                }
            })
            .collect();

        let pattern_days = raw
            .course_type_days
            .iter()
            .map(|(course_type, keys)| {
                (course_type.clone(), keys.iter().map(value_as_key).collect())
            })
            .collect();

        let mut bell_patterns = BTreeMap::new();
        for (course_type, patterns) in &raw.daily_pattern_bells {
            let mut by_key = BTreeMap::new();
            for (pattern_key, entries) in patterns {
                let mut bells = Vec::with_capacity(entries.len());
                for (index, value) in entries.iter().enumerate() {
                    let location = format!("DailyPatternBells.{course_type}.{pattern_key}[{index}]");
                    match parse_bell(&location, value) {
                        Ok(bell) => bells.push(bell),
                        Err(e) => quarantined.push(e),
                    }
                }
                by_key.insert(pattern_key.clone(), bells);
            }
            bell_patterns.insert(course_type.clone(), by_key);
        }

        let mut bell_config = BTreeMap::new();
        for (bell_type, value) in &raw.bell_config {
            match value_as_count(value).filter(|&n| n > 0) {
                Some(count) => {
                    bell_config.insert(bell_type.clone(), clamp_count(count));
                }
                None => quarantined.push(ScheduleError::MalformedScheduleEntry {
                    location: format!("BellConfig.{bell_type}"),
                    reason: format!("strike count {value} is not a positive number"),
                }),
            }
        }

        for e in &quarantined {
            debug!("Quarantined schedule entry: {}", e);
        }

        Parsed {
            description: ScheduleDescription {
                periods,
                pattern_days,
                bell_patterns,
                bell_config,
                marker: raw.marker(),
            },
            quarantined,
        }
    }

    /// Resolved length of a period: explicit if positive, else the number of
    /// pattern-day keys for its course type.
    pub fn period_length(&self, period: &CoursePeriod) -> u32 {
        period.explicit_length.unwrap_or_else(|| {
            self.pattern_days
                .get(&period.course_type)
                .map(|keys| u32::try_from(keys.len()).unwrap_or(u32::MAX))
                .unwrap_or(0)
        })
    }

    /// Pattern key for a day offset; `None` means no bells that day.
    pub fn pattern_key(&self, course_type: &str, day: usize) -> Option<&PatternKey> {
        self.pattern_days
            .get(course_type)
            .and_then(|keys| keys.get(day))
            .and_then(Option::as_ref)
    }

    /// Bells for a (course type, pattern key) pair; empty when undefined.
    pub fn bells(&self, course_type: &str, pattern_key: &str) -> &[BellEntry] {
        self.bell_patterns
            .get(course_type)
            .and_then(|patterns| patterns.get(pattern_key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Explicit count, else the bell type's configured default, else 1.
    pub fn resolve_strikes(&self, bell: &BellEntry) -> u32 {
        bell.count
            .or_else(|| self.bell_config.get(&bell.bell_type).copied())
            .unwrap_or(1)
    }
}

fn parse_period(index: usize, value: &Value) -> Result<CoursePeriod, ScheduleError> {
    let malformed = |reason: &str| ScheduleError::MalformedScheduleEntry {
        location: format!("CourseSchedule[{index}]"),
        reason: reason.to_string(),
    };

    let obj = value.as_object().ok_or_else(|| malformed("not an object"))?;
    let course_type = obj
        .get("courseType")
        .and_then(value_as_key)
        .ok_or_else(|| malformed("missing courseType"))?;
    let start = obj
        .get("startDate")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| malformed("missing startDate"))?;
    let start_date = parse_date(start).ok_or_else(|| ScheduleError::UnparseableDate {
        index,
        value: start.to_string(),
    })?;

    // `days` wins over `length`; zero or negative values defer to the pattern-day count
    let explicit_length = ["days", "length"]
        .iter()
        .filter_map(|field| obj.get(*field).and_then(value_as_count))
        .find(|&n| n > 0)
        .map(clamp_count);

    Ok(CoursePeriod {
        course_type,
        start_date,
        explicit_length,
    })
}

fn parse_bell(location: &str, value: &Value) -> Result<BellEntry, ScheduleError> {
    let malformed = |reason: String| ScheduleError::MalformedScheduleEntry {
        location: location.to_string(),
        reason,
    };

    let obj = value
        .as_object()
        .ok_or_else(|| malformed("not an object".to_string()))?;
    let raw_time = obj
        .get("time")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| malformed("missing time".to_string()))?;
    let time =
        TimeOfDay::parse(raw_time).ok_or_else(|| malformed(format!("invalid time {raw_time:?}")))?;
    let bell_type = obj
        .get("bellType")
        .and_then(value_as_key)
        .unwrap_or_else(|| DEFAULT_BELL_TYPE.to_string());
    let count = obj
        .get("count")
        .and_then(value_as_count)
        .filter(|&n| n > 0)
        .map(clamp_count);

    Ok(BellEntry {
        time,
        bell_type,
        count,
    })
}

/// Reads an identifier that may arrive as a string or a number.
fn value_as_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => n
            .as_i64()
            .map(|i| i.to_string())
            .or_else(|| n.as_f64().map(|f| f.to_string())),
        _ => None,
    }
}

/// Reads a count that may arrive as a number or a numeric string.
fn value_as_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn clamp_count(n: i64) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawScheduleDescription {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_date_is_strict() {
        assert_eq!(parse_date("2024-01-01"), NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(parse_date("2024-1-1"), None);
        assert_eq!(parse_date("2024-02-30"), None);
        assert_eq!(parse_date("01/01/2024"), None);
    }

    #[test]
    fn test_time_of_day_parse_and_display() {
        assert_eq!(TimeOfDay::parse("08:05").unwrap().to_string(), "08:05");
        assert_eq!(TimeOfDay::parse("8:05").unwrap().to_string(), "08:05");
        assert!(TimeOfDay::parse("24:00").is_none());
        assert!(TimeOfDay::parse("12:60").is_none());
        assert!(TimeOfDay::parse("noon").is_none());
        assert!(TimeOfDay::new(0, 0).unwrap().is_midnight());
    }

    #[test]
    fn test_time_of_day_orders_chronologically() {
        let early = TimeOfDay::parse("9:30").unwrap();
        let late = TimeOfDay::parse("10:00").unwrap();
        assert!(early < late);
    }

    #[test]
    fn test_alarm_event_serializes_with_wire_names() {
        let event = AlarmEvent {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            time: TimeOfDay::new(8, 0).unwrap(),
            bell_type: "1".to_string(),
            strike_count: 4,
            course_type: "X".to_string(),
            pattern_key: "A".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "date": "2024-01-01",
                "time": "08:00",
                "bellType": "1",
                "count": 4,
                "courseType": "X",
                "patternKey": "A"
            })
        );
    }

    #[test]
    fn test_from_raw_quarantines_bad_periods() {
        let parsed = ScheduleDescription::from_raw(&raw(json!({
            "CourseSchedule": [
                {"courseType": "X", "startDate": "2024-01-01", "days": 2},
                {"courseType": "X", "startDate": "not-a-date"},
                {"startDate": "2024-01-01"},
                "garbage"
            ]
        })));

        assert_eq!(parsed.description.periods.len(), 1);
        assert_eq!(parsed.quarantined.len(), 3);
        assert!(parsed
            .quarantined
            .iter()
            .any(|e| matches!(e, ScheduleError::UnparseableDate { index: 1, .. })));
        assert!(parsed.quarantined.iter().all(|e| matches!(
            e,
            ScheduleError::MalformedScheduleEntry { .. } | ScheduleError::UnparseableDate { .. }
        )));
    }

    #[test]
    fn test_from_raw_length_precedence() {
        let parsed = ScheduleDescription::from_raw(&raw(json!({
            "CourseSchedule": [
                {"courseType": "X", "startDate": "2024-01-01", "days": 0, "length": "3"},
                {"courseType": "X", "startDate": "2024-01-01", "days": -1},
                {"courseType": "X", "startDate": "2024-01-01", "days": 5, "length": 9}
            ],
            "CourseTypeDays": {"X": ["A", "B"]}
        })));
        let d = &parsed.description;

        assert_eq!(d.periods[0].explicit_length, Some(3));
        assert_eq!(d.periods[1].explicit_length, None);
        assert_eq!(d.period_length(&d.periods[1]), 2);
        assert_eq!(d.periods[2].explicit_length, Some(5));
    }

    #[test]
    fn test_from_raw_bell_entries() {
        let parsed = ScheduleDescription::from_raw(&raw(json!({
            "DailyPatternBells": {"X": {"A": [
                {"time": "08:00", "bellType": 2, "count": "3"},
                {"bellType": "1"},
                {"time": "7:5"},
                {"time": "9:10", "count": 0}
            ]}}
        })));
        let bells = parsed.description.bells("X", "A");

        assert_eq!(bells.len(), 2);
        assert_eq!(bells[0].bell_type, "2");
        assert_eq!(bells[0].count, Some(3));
        assert_eq!(bells[1].time.to_string(), "09:10");
        assert_eq!(bells[1].bell_type, DEFAULT_BELL_TYPE);
        assert_eq!(bells[1].count, None);
        assert_eq!(parsed.quarantined.len(), 2);
    }

    #[test]
    fn test_pattern_key_holes() {
        let parsed = ScheduleDescription::from_raw(&raw(json!({
            "CourseTypeDays": {"X": ["A", null, "", "B"]}
        })));
        let d = &parsed.description;

        assert_eq!(d.pattern_key("X", 0).map(String::as_str), Some("A"));
        assert_eq!(d.pattern_key("X", 1), None);
        assert_eq!(d.pattern_key("X", 2), None);
        assert_eq!(d.pattern_key("X", 3).map(String::as_str), Some("B"));
        assert_eq!(d.pattern_key("X", 4), None);
        assert_eq!(d.pattern_key("Y", 0), None);
    }

    #[test]
    fn test_strike_resolution_precedence() {
        let parsed = ScheduleDescription::from_raw(&raw(json!({
            "BellConfig": {"1": 4, "2": 0}
        })));
        let d = &parsed.description;
        let bell = |bell_type: &str, count: Option<u32>| BellEntry {
            time: TimeOfDay::new(8, 0).unwrap(),
            bell_type: bell_type.to_string(),
            count,
        };

        assert_eq!(d.resolve_strikes(&bell("1", Some(2))), 2);
        assert_eq!(d.resolve_strikes(&bell("1", None)), 4);
        assert_eq!(d.resolve_strikes(&bell("2", None)), 1);
        assert_eq!(d.resolve_strikes(&bell("9", None)), 1);
        assert_eq!(parsed.quarantined.len(), 1);
    }

    #[test]
    fn test_raw_round_trips_through_json_with_marker() {
        let original = raw(json!({
            "CourseSchedule": [{"courseType": "X", "startDate": "2024-01-01"}],
            "BellConfig": {"1": 4},
            "generatedAt": "2024-01-01T00:00:00Z"
        }));
        let text = original.to_json().unwrap();
        let back = RawScheduleDescription::from_json(&text).unwrap();

        assert_eq!(back, original);
        assert_eq!(back.marker(), Some(FreshnessMarker::new("2024-01-01T00:00:00Z")));
    }

    #[test]
    fn test_invalid_top_level_shape_is_rejected() {
        let result = RawScheduleDescription::from_json(r#"{"CourseSchedule": 5}"#);
        assert!(matches!(result, Err(ScheduleError::InvalidDescription { .. })));
    }
}
