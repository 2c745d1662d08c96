//! Time arithmetic for task schedules.
//!
//! Pure functions only: parsing time-of-day and period specs, and computing how
//! long to wait until a time of day comes around in a given timezone.

use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub const SECONDS_PER_DAY: u32 = 86_400;

/// Time unit for interval-based scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl std::str::FromStr for TimeUnit {
    type Err = String;

    /// Parse TimeUnit from its full lowercase name: "seconds", "minutes", "hours", "days", "weeks".
    /// For shorthand notations like "5s" or "2w", use `parse_duration` instead.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "seconds" => Ok(TimeUnit::Seconds),
            "minutes" => Ok(TimeUnit::Minutes),
            "hours" => Ok(TimeUnit::Hours),
            "days" => Ok(TimeUnit::Days),
            "weeks" => Ok(TimeUnit::Weeks),
            _ => Err(format!("Invalid time unit: {}", s)),
        }
    }
}

impl TimeUnit {
    /// Map a single-letter suffix (`s`, `m`, `h`, `d`, `w`) to its unit.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "s" => Some(TimeUnit::Seconds),
            "m" => Some(TimeUnit::Minutes),
            "h" => Some(TimeUnit::Hours),
            "d" => Some(TimeUnit::Days),
            "w" => Some(TimeUnit::Weeks),
            _ => None,
        }
    }

    pub fn to_seconds(&self, value: u64) -> u64 {
        match self {
            TimeUnit::Seconds => value,
            TimeUnit::Minutes => value.saturating_mul(60),
            TimeUnit::Hours => value.saturating_mul(3_600),
            TimeUnit::Days => value.saturating_mul(86_400),
            TimeUnit::Weeks => value.saturating_mul(604_800),
        }
    }

    /// Parse a duration string like "5s", "10m", "2h", "1w".
    /// Returns (value, TimeUnit) if successful
    ///
    /// Strict rules:
    /// - Only lowercase single-letter suffixes are accepted
    /// - Format must be: <digits><suffix>, no spaces in between
    pub fn parse_duration(s: &str) -> Option<(u64, TimeUnit)> {
        let s = s.trim();

        let split_pos = s.find(|c: char| !c.is_ascii_digit())?;
        if split_pos == 0 {
            return None;
        }

        let (num_str, unit_str) = s.split_at(split_pos);
        let value = num_str.parse::<u64>().ok()?;
        let time_unit = Self::from_suffix(unit_str)?;

        Some((value, time_unit))
    }
}

/// Seconds since local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u32);

impl TimeOfDay {
    pub fn from_seconds(seconds: u32) -> Self {
        Self(seconds)
    }

    /// Saturates at `u32::MAX` seconds.
    pub fn from_hms(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self(
            hours
                .saturating_mul(3_600)
                .saturating_add(minutes.saturating_mul(60))
                .saturating_add(seconds),
        )
    }

    pub fn seconds(&self) -> u32 {
        self.0
    }
}

/// Whole seconds between the end of one run and the start of the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(u64);

impl Period {
    pub fn from_secs(seconds: u64) -> Self {
        Self(seconds)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }
}

/// A period as written by the caller: a bare number of seconds or a string
/// such as `"90"` or `"5m"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PeriodSpec {
    Seconds(u64),
    Text(String),
}

impl From<u64> for PeriodSpec {
    fn from(seconds: u64) -> Self {
        PeriodSpec::Seconds(seconds)
    }
}

/// Negative values become text so that they fail to parse as a period.
impl From<i32> for PeriodSpec {
    fn from(seconds: i32) -> Self {
        match u64::try_from(seconds) {
            Ok(seconds) => PeriodSpec::Seconds(seconds),
            Err(_) => PeriodSpec::Text(seconds.to_string()),
        }
    }
}

impl From<&str> for PeriodSpec {
    fn from(text: &str) -> Self {
        PeriodSpec::Text(text.to_string())
    }
}

impl From<String> for PeriodSpec {
    fn from(text: String) -> Self {
        PeriodSpec::Text(text)
    }
}

impl std::fmt::Display for PeriodSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeriodSpec::Seconds(seconds) => write!(f, "{seconds}"),
            PeriodSpec::Text(text) => f.write_str(text),
        }
    }
}

/// Parse `HH`, `HH:MM` or `HH:MM:SS` into seconds since midnight.
///
/// Returns `None` for anything else: a non-numeric segment, an empty segment,
/// or more than three segments.
pub fn parse_time_of_day(spec: &str) -> Option<TimeOfDay> {
    let segments: Vec<&str> = spec.split(':').collect();
    if segments.is_empty() || segments.len() > 3 {
        return None;
    }

    let mut total: u64 = 0;
    for (segment, weight) in segments.iter().zip([3_600u64, 60, 1]) {
        let value = segment.trim().parse::<u64>().ok()?;
        total = total.checked_add(value.checked_mul(weight)?)?;
    }

    u32::try_from(total).ok().map(TimeOfDay)
}

/// Normalize a period spec into whole seconds.
///
/// Numbers pass through unchanged. `<digits><unit>` strings are multiplied by
/// the unit, other strings must be plain unsigned integers.
pub fn parse_period(spec: &PeriodSpec) -> Option<Period> {
    match spec {
        PeriodSpec::Seconds(seconds) => Some(Period(*seconds)),
        PeriodSpec::Text(text) => {
            if let Some((value, unit)) = TimeUnit::parse_duration(text) {
                return Some(Period(unit.to_seconds(value)));
            }
            text.trim().parse::<u64>().ok().map(Period)
        }
    }
}

/// Seconds from `now` until the next occurrence of `time_of_day` in `timezone`.
///
/// Always in `[0, 86399]`. Zero means the time of day is the current second.
pub fn seconds_until(time_of_day: TimeOfDay, now: DateTime<Utc>, timezone: Tz) -> u32 {
    let current = now.with_timezone(&timezone).num_seconds_from_midnight() % SECONDS_PER_DAY;
    let desired = time_of_day.seconds() % SECONDS_PER_DAY;
    (SECONDS_PER_DAY + desired - current) % SECONDS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const MIN: u64 = 60;
    const HOUR: u64 = MIN * 60;
    const DAY: u64 = HOUR * 24;
    const WEEK: u64 = DAY * 7;

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, hour, minute, second).unwrap()
    }

    #[test]
    fn parses_hours_minutes_and_seconds() {
        assert_eq!(parse_time_of_day("01"), Some(TimeOfDay::from_seconds(3_600)));
        assert_eq!(parse_time_of_day("1:30"), Some(TimeOfDay::from_seconds(5_400)));
        assert_eq!(parse_time_of_day("15:20:18"), Some(TimeOfDay::from_seconds(55_218)));
        assert_eq!(parse_time_of_day("00:00"), Some(TimeOfDay::from_seconds(0)));
        assert_eq!(parse_time_of_day("0:0"), Some(TimeOfDay::from_hms(0, 0, 0)));
        assert_eq!(parse_time_of_day("22:01:05"), Some(TimeOfDay::from_hms(22, 1, 5)));
    }

    #[test]
    fn from_hms_saturates_instead_of_wrapping() {
        assert_eq!(TimeOfDay::from_hms(1, 2, 3).seconds(), 3_723);
        assert_eq!(TimeOfDay::from_hms(u32::MAX, 59, 59).seconds(), u32::MAX);
        assert_eq!(TimeOfDay::from_hms(0, u32::MAX, 0).seconds(), u32::MAX);
    }

    #[test]
    fn rejects_malformed_time_of_day() {
        assert_eq!(parse_time_of_day("noon"), None);
        assert_eq!(parse_time_of_day("10:00:12:34"), None);
        assert_eq!(parse_time_of_day("10:ten:00"), None);
        assert_eq!(parse_time_of_day(""), None);
        assert_eq!(parse_time_of_day("10:"), None);
        assert_eq!(parse_time_of_day("-1:00"), None);
    }

    #[test]
    fn parses_period_shorthands() {
        assert_eq!(parse_period(&"1w".into()), Some(Period::from_secs(WEEK)));
        assert_eq!(parse_period(&"1d".into()), Some(Period::from_secs(DAY)));
        assert_eq!(parse_period(&"1h".into()), Some(Period::from_secs(HOUR)));
        assert_eq!(parse_period(&"1m".into()), Some(Period::from_secs(MIN)));
        assert_eq!(parse_period(&"45s".into()), Some(Period::from_secs(45)));
        assert_eq!(parse_period(&"3d".into()), Some(Period::from_secs(3 * DAY)));
    }

    #[test]
    fn numeric_periods_are_seconds() {
        assert_eq!(parse_period(&"1000".into()), Some(Period::from_secs(1000)));
        assert_eq!(parse_period(&"130".into()), Some(Period::from_secs(130)));
        assert_eq!(parse_period(&1000.into()), Some(Period::from_secs(1000)));
        assert_eq!(parse_period(&0.into()), Some(Period::from_secs(0)));
    }

    #[test]
    fn garbage_period_is_not_a_number() {
        assert_eq!(parse_period(&"soon".into()), None);
        assert_eq!(parse_period(&"5 m".into()), None);
        assert_eq!(parse_period(&"5ms".into()), None);
        assert_eq!(parse_period(&"m".into()), None);
    }

    #[test]
    fn time_unit_from_full_name() {
        assert_eq!("Hours".parse::<TimeUnit>(), Ok(TimeUnit::Hours));
        assert!("fortnights".parse::<TimeUnit>().is_err());
    }

    #[test]
    fn seconds_until_is_zero_at_the_target_second() {
        let now = at(12, 0, 0);
        assert_eq!(seconds_until(TimeOfDay::from_hms(12, 0, 0), now, Tz::UTC), 0);
    }

    #[test]
    fn seconds_until_wraps_past_midnight() {
        let now = at(23, 59, 50);
        assert_eq!(seconds_until(TimeOfDay::from_hms(0, 0, 5), now, Tz::UTC), 15);
        assert_eq!(seconds_until(TimeOfDay::from_hms(23, 59, 49), now, Tz::UTC), 86_399);
    }

    #[test]
    fn seconds_until_uses_the_timezone() {
        // Moscow is UTC+3 all year.
        let now = at(21, 0, 0);
        let moscow = chrono_tz::Europe::Moscow;
        assert_eq!(seconds_until(TimeOfDay::from_hms(0, 0, 0), now, moscow), 0);
        assert_eq!(seconds_until(TimeOfDay::from_hms(1, 0, 0), now, moscow), 3_600);
        assert_eq!(seconds_until(TimeOfDay::from_hms(21, 0, 0), now, Tz::UTC), 0);
    }

    #[test]
    fn seconds_until_stays_within_a_day() {
        let now = at(7, 31, 12);
        for seconds in (0..SECONDS_PER_DAY * 2).step_by(997) {
            let wait = seconds_until(TimeOfDay::from_seconds(seconds), now, Tz::UTC);
            assert!(wait < SECONDS_PER_DAY, "{seconds} -> {wait}");
        }
    }
}
