//! Broadcast-clock arithmetic.
//!
//! Broadcast schedules write post-midnight times on the previous day's sheet
//! (`25:30:00` is 01:30 the next calendar day). Everything that turns a
//! `(date, time-of-day)` pair into an absolute instant goes through here.

use std::fmt;

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    #[error("time of day is missing")]
    MissingTime,
    #[error("malformed time of day `{0}`")]
    MalformedTime(String),
    #[error("malformed calendar date `{0}`")]
    MalformedDate(String),
    #[error("timestamp out of range")]
    OutOfRange,
}

/// Absolute broadcast instant (wall clock of the schedule, no time zone).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BroadcastTimestamp(NaiveDateTime);

impl BroadcastTimestamp {
    pub fn new(at: NaiveDateTime) -> Self {
        Self(at)
    }

    pub fn as_naive(&self) -> NaiveDateTime {
        self.0
    }

    /// Shift by a signed number of seconds; `None` only when chrono's range is exceeded.
    pub fn checked_offset(self, seconds: i64) -> Option<Self> {
        TimeDelta::try_seconds(seconds)
            .and_then(|delta| self.0.checked_add_signed(delta))
            .map(Self)
    }

    /// Signed seconds from `self` to `later` (negative when `later` is earlier).
    pub fn seconds_until(self, later: Self) -> i64 {
        (later.0 - self.0).num_seconds()
    }
}

impl From<NaiveDateTime> for BroadcastTimestamp {
    fn from(at: NaiveDateTime) -> Self {
        Self(at)
    }
}

impl fmt::Display for BroadcastTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
    }
}

/// `H:MM[:SS]` split into components; hours are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ClockReading {
    hours: u32,
    minutes: u32,
    seconds: u32,
}

impl ClockReading {
    fn parse(time: &str) -> Result<Self, ClockError> {
        let trimmed = time.trim();
        if trimmed.is_empty() {
            return Err(ClockError::MissingTime);
        }
        let malformed = || ClockError::MalformedTime(trimmed.to_string());

        let parts: Vec<&str> = trimmed.split(':').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(malformed());
        }
        let hours = parse_component(parts[0]).ok_or_else(malformed)?;
        let minutes = parse_component(parts[1]).ok_or_else(malformed)?;
        let seconds = match parts.get(2) {
            Some(part) => parse_component(part).ok_or_else(malformed)?,
            None => 0,
        };
        if minutes >= 60 || seconds >= 60 {
            return Err(malformed());
        }

        Ok(Self {
            hours,
            minutes,
            seconds,
        })
    }

    fn total_seconds(self) -> u64 {
        u64::from(self.hours) * 3600 + u64::from(self.minutes) * 60 + u64::from(self.seconds)
    }
}

fn parse_component(part: &str) -> Option<u32> {
    let part = part.trim();
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

/// Parse a calendar date as found in broadcast exports.
///
/// Accepts `YYYY-MM-DD`, `YYYY.MM.DD`, `YYYY/MM/DD` and compact `YYYYMMDD`; a trailing
/// time portion (`2024-05-01 00:00:00`, `2024-05-01T00:00:00`) is ignored.
pub fn parse_broadcast_date(date: &str) -> Result<NaiveDate, ClockError> {
    let malformed = || ClockError::MalformedDate(date.trim().to_string());
    let token = date
        .split_whitespace()
        .next()
        .and_then(|t| t.split('T').next())
        .ok_or_else(malformed)?;
    if token.len() == 8 && token.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(token, "%Y%m%d").map_err(|_| malformed());
    }
    let cleaned = token.replace(['.', '/'], "-");
    NaiveDate::parse_from_str(cleaned.trim_end_matches('-'), "%Y-%m-%d").map_err(|_| malformed())
}

/// Normalize `(date, time)` onto an absolute timestamp, then apply `offset_seconds`.
///
/// Rollover (`H >= 24`) is decided on the raw hour; the offset is applied last.
pub fn normalize(
    date: &str,
    time: &str,
    offset_seconds: i64,
) -> Result<BroadcastTimestamp, ClockError> {
    let reading = ClockReading::parse(time)?;
    let date = parse_broadcast_date(date)?;
    compose(date, reading, offset_seconds)
}

/// Same as [`normalize`] for an already parsed calendar date.
pub fn normalize_on(
    date: NaiveDate,
    time: &str,
    offset_seconds: i64,
) -> Result<BroadcastTimestamp, ClockError> {
    compose(date, ClockReading::parse(time)?, offset_seconds)
}

fn compose(
    date: NaiveDate,
    reading: ClockReading,
    offset_seconds: i64,
) -> Result<BroadcastTimestamp, ClockError> {
    let day = date
        .checked_add_days(Days::new(u64::from(reading.hours / 24)))
        .ok_or(ClockError::OutOfRange)?;
    let time = NaiveTime::from_hms_opt(reading.hours % 24, reading.minutes, reading.seconds)
        .ok_or(ClockError::OutOfRange)?;
    BroadcastTimestamp(day.and_time(time))
        .checked_offset(offset_seconds)
        .ok_or(ClockError::OutOfRange)
}

/// Seconds since midnight of the sheet's date, rollover aware (`25:00` → 90000).
pub fn seconds_since_midnight(time: &str) -> Option<u64> {
    ClockReading::parse(time).ok().map(ClockReading::total_seconds)
}

/// Parse a plain time of day (hours below 24), e.g. a broadcast-day cutoff.
pub fn parse_time_of_day(time: &str) -> Result<NaiveTime, ClockError> {
    let reading = ClockReading::parse(time)?;
    NaiveTime::from_hms_opt(reading.hours, reading.minutes, reading.seconds)
        .ok_or_else(|| ClockError::MalformedTime(time.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str, time: &str) -> BroadcastTimestamp {
        let naive = NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S")
            .expect("fixture timestamp");
        BroadcastTimestamp::new(naive)
    }

    #[test]
    fn same_day_time_stays_on_date() {
        assert_eq!(
            normalize("2024-05-01", "09:30:15", 0).unwrap(),
            at("2024-05-01", "09:30:15")
        );
    }

    #[test]
    fn hours_past_24_roll_into_next_day() {
        assert_eq!(
            normalize("2024-05-01", "25:30:00", 0).unwrap(),
            at("2024-05-02", "01:30:00")
        );
        assert_eq!(
            normalize("2024-05-01", "24:00", 0).unwrap(),
            at("2024-05-02", "00:00:00")
        );
        assert_eq!(
            normalize("2024-12-31", "49:05:00", 0).unwrap(),
            at("2025-01-02", "01:05:00")
        );
    }

    #[test]
    fn missing_seconds_default_to_zero() {
        assert_eq!(
            normalize("2024-05-01", "9:05", 0).unwrap(),
            at("2024-05-01", "09:05:00")
        );
    }

    #[test]
    fn dotted_and_suffixed_dates_are_accepted() {
        let expected = at("2024-05-01", "10:00:00");
        assert_eq!(normalize("2024.05.01", "10:00:00", 0).unwrap(), expected);
        assert_eq!(normalize("2024.05.01.", "10:00:00", 0).unwrap(), expected);
        assert_eq!(normalize("2024-05-01 00:00:00", "10:00:00", 0).unwrap(), expected);
        assert_eq!(normalize("2024-05-01T00:00:00", "10:00:00", 0).unwrap(), expected);
    }

    #[test]
    fn compact_dates_are_accepted() {
        assert_eq!(
            normalize("20240501", "10:00:00", 0).unwrap(),
            at("2024-05-01", "10:00:00")
        );
        assert_eq!(
            parse_broadcast_date("20241231 00:00:00").unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
        );
        assert!(matches!(
            parse_broadcast_date("20241340"),
            Err(ClockError::MalformedDate(_))
        ));
    }

    #[test]
    fn unparseable_inputs_are_explicit() {
        assert_eq!(normalize("2024-05-01", "", 0), Err(ClockError::MissingTime));
        assert_eq!(normalize("2024-05-01", "   ", 0), Err(ClockError::MissingTime));
        assert!(matches!(
            normalize("2024-05-01", "9h30", 0),
            Err(ClockError::MalformedTime(_))
        ));
        assert!(matches!(
            normalize("2024-05-01", "09:75:00", 0),
            Err(ClockError::MalformedTime(_))
        ));
        assert!(matches!(
            normalize("2024-05-01", "09:00:00:00", 0),
            Err(ClockError::MalformedTime(_))
        ));
        assert!(matches!(
            normalize("2024-05-01", "-1:00", 0),
            Err(ClockError::MalformedTime(_))
        ));
        assert!(matches!(
            normalize("May first", "09:00:00", 0),
            Err(ClockError::MalformedDate(_))
        ));
        assert!(matches!(
            normalize("", "09:00:00", 0),
            Err(ClockError::MalformedDate(_))
        ));
    }

    #[test]
    fn offset_is_applied_after_rollover() {
        // 24:00:02 - 3s crosses back over midnight, but the date rollover was
        // already decided on the raw hour.
        assert_eq!(
            normalize("2024-05-01", "24:00:02", -3).unwrap(),
            at("2024-05-01", "23:59:59")
        );
        assert_eq!(
            normalize("2024-05-01", "09:00:00", -3).unwrap(),
            at("2024-05-01", "08:59:57")
        );
    }

    #[test]
    fn normalize_is_deterministic_and_zero_offset_is_identity() {
        let first = normalize("2024-05-01", "26:10:00", 0).unwrap();
        let second = normalize("2024-05-01", "26:10:00", 0).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.checked_offset(0), Some(first));
    }

    #[test]
    fn offset_round_trips() {
        let base = at("2024-05-01", "23:59:58");
        for k in [-86_400, -3, 0, 2, 15, 3_601] {
            let shifted = base.checked_offset(k).unwrap();
            assert_eq!(shifted.checked_offset(-k), Some(base));
        }
    }

    #[test]
    fn seconds_since_midnight_keeps_rollover_order() {
        assert_eq!(seconds_since_midnight("00:00:00"), Some(0));
        assert_eq!(seconds_since_midnight("23:59:59"), Some(86_399));
        assert_eq!(seconds_since_midnight("25:00:00"), Some(90_000));
        assert_eq!(seconds_since_midnight("1:02"), Some(3_720));
        assert_eq!(seconds_since_midnight("later"), None);
    }

    #[test]
    fn time_of_day_rejects_rollover_hours() {
        assert_eq!(
            parse_time_of_day("02:00").unwrap(),
            NaiveTime::from_hms_opt(2, 0, 0).unwrap()
        );
        assert!(parse_time_of_day("26:00:00").is_err());
    }

    #[test]
    fn seconds_until_is_signed() {
        let a = at("2024-05-01", "09:00:00");
        let b = at("2024-05-01", "09:10:00");
        assert_eq!(a.seconds_until(b), 600);
        assert_eq!(b.seconds_until(a), -600);
    }
}
