//! Wall-clock helpers shared by every scheduling component.
//!
//! Times of day are `NaiveTime` values in the single reference timezone. The
//! textual form used in storage and user input is zero-padded `"HH:MM"`.
//! Weekday indices run Monday = 0 through Sunday = 6.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::{Result, TutorError};

pub const MINUTES_PER_DAY: u32 = 24 * 60;

pub const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Parse an `"HH:MM"` string (single-digit hours accepted) into a time of day.
pub fn parse_hhmm(input: &str) -> Result<NaiveTime> {
    let trimmed = input.trim();
    let malformed = || TutorError::validation(format!("expected HH:MM, got '{input}'"));

    let (h, m) = trimmed.split_once(':').ok_or_else(malformed)?;
    if h.is_empty()
        || h.len() > 2
        || m.len() != 2
        || !h.chars().all(|c| c.is_ascii_digit())
        || !m.chars().all(|c| c.is_ascii_digit())
    {
        return Err(malformed());
    }

    let hour: u32 = h.parse().map_err(|_| malformed())?;
    let minute: u32 = m.parse().map_err(|_| malformed())?;
    if hour > 23 {
        return Err(TutorError::validation(format!(
            "hour {hour} out of range 0-23 in '{input}'"
        )));
    }
    if minute > 59 {
        return Err(TutorError::validation(format!(
            "minute {minute} out of range 0-59 in '{input}'"
        )));
    }

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(malformed)
}

/// Render a time of day as zero-padded `"HH:MM"` (seconds are dropped).
pub fn format_hhmm(time: NaiveTime) -> String {
    format!("{:02}:{:02}", time.hour(), time.minute())
}

/// Minutes elapsed since midnight, ignoring seconds.
pub fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Inverse of [`minute_of_day`]. `None` at or past midnight.
pub fn from_minute_of_day(minutes: u32) -> Option<NaiveTime> {
    if minutes >= MINUTES_PER_DAY {
        return None;
    }
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
}

/// Add minutes to a time of day.
///
/// Lessons never cross midnight, so a result at or past 24:00 is rejected
/// instead of wrapping around.
pub fn add_minutes(time: NaiveTime, minutes: u32) -> Result<NaiveTime> {
    let total = minute_of_day(time).checked_add(minutes);
    total.and_then(from_minute_of_day).ok_or_else(|| {
        TutorError::validation(format!(
            "slot end exceeds working hours: {} + {} min crosses midnight",
            format_hhmm(time),
            minutes
        ))
    })
}

pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

pub fn weekday_name(index: u8) -> &'static str {
    WEEKDAY_NAMES
        .get(index as usize)
        .copied()
        .unwrap_or("Unknown")
}

pub fn validate_weekday(day: u8) -> Result<u8> {
    if day > 6 {
        return Err(TutorError::validation(format!(
            "day_of_week {day} out of range 0-6"
        )));
    }
    Ok(day)
}

pub fn validate_duration(duration_minutes: u32) -> Result<u32> {
    if duration_minutes == 0 {
        return Err(TutorError::validation("duration must be positive"));
    }
    if duration_minutes >= MINUTES_PER_DAY {
        return Err(TutorError::validation(format!(
            "duration {duration_minutes} min does not fit in a day"
        )));
    }
    Ok(duration_minutes)
}

/// Next calendar date on or after `now` that falls on `weekday`.
///
/// When today matches, today is used only if `time` is still strictly in the
/// future; otherwise the date rolls forward a full week.
pub fn next_date_for_weekday(now: NaiveDateTime, weekday: u8, time: NaiveTime) -> NaiveDate {
    let today = weekday_index(now.date()) as i64;
    let mut days_ahead = (weekday as i64 - today).rem_euclid(7);
    if days_ahead == 0 && time <= now.time() {
        days_ahead = 7;
    }
    now.date() + Duration::days(days_ahead)
}

/// Concrete datetime of the next occurrence of a weekly `(weekday, time)`.
pub fn next_occurrence(now: NaiveDateTime, weekday: u8, time: NaiveTime) -> NaiveDateTime {
    next_date_for_weekday(now, weekday, time).and_time(time)
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(weekday_index(date) as i64)
}

/// Half-open interval overlap: `[a_start, a_end)` against `[b_start, b_end)`.
/// Touching boundaries do not overlap.
pub fn intervals_overlap<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && a_end > b_start
}
