//! Calendar arithmetic
//!
//! Everything here works on [`NaiveDate`]: a planner day has no time-of-day,
//! so "same day" is plain date equality. Weeks are Monday-anchored.

use chrono::{DateTime, Datelike, Days, Local, NaiveDate, TimeZone};

use crate::error::{Error, Result};

/// Number of cells in a month grid (six Monday-start weeks)
pub const MONTH_GRID_CELLS: usize = 42;

/// The calendar day of `instant` in its own time zone.
pub fn start_of_day<Tz: TimeZone>(instant: &DateTime<Tz>) -> NaiveDate {
    instant.date_naive()
}

/// Today's local date.
pub fn today() -> NaiveDate {
    start_of_day(&Local::now())
}

/// Monday on or before `date`; a Sunday maps to the Monday six days earlier.
pub fn start_of_week(date: NaiveDate) -> NaiveDate {
    let back = u64::from(date.weekday().num_days_from_monday());
    date.checked_sub_days(Days::new(back)).unwrap_or(date)
}

/// Weekday index with Sunday = 0 through Saturday = 6.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// `date` shifted by `days` (negative goes back), `None` past chrono's range.
pub fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    let magnitude = Days::new(days.unsigned_abs());
    if days >= 0 {
        date.checked_add_days(magnitude)
    } else {
        date.checked_sub_days(magnitude)
    }
}

/// Consecutive days starting at `start`, stopping early at the end of
/// chrono's representable range.
pub fn days_from(start: NaiveDate, count: u32) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take(count as usize)
}

/// The seven days of the Monday-start week containing `date`.
pub fn week_of(date: NaiveDate) -> Vec<NaiveDate> {
    days_from(start_of_week(date), 7).collect()
}

/// 42 consecutive days starting at the Monday on or before the 1st of
/// `date`'s month, each flagged with whether it belongs to that month.
pub fn month_grid(date: NaiveDate) -> Vec<(NaiveDate, bool)> {
    let first = date.with_day(1).unwrap_or(date);
    days_from(start_of_week(first), MONTH_GRID_CELLS as u32)
        .map(|day| {
            let in_month = day.year() == date.year() && day.month() == date.month();
            (day, in_month)
        })
        .collect()
}

/// Parse a user-supplied day: `today`, `tomorrow`, `yesterday`, `+N`/`-N`
/// relative to `today`, or an ISO `YYYY-MM-DD` date.
pub fn parse_day(input: &str, today: NaiveDate) -> Result<NaiveDate> {
    let trimmed = input.trim();
    let relative = match trimmed.to_ascii_lowercase().as_str() {
        "today" => Some(0),
        "tomorrow" => Some(1),
        "yesterday" => Some(-1),
        other if other.starts_with('+') || other.starts_with('-') => {
            Some(other.parse::<i64>().map_err(|_| {
                Error::InvalidArgument(format!("invalid day offset '{trimmed}'"))
            })?)
        }
        _ => None,
    };

    if let Some(offset) = relative {
        return add_days(today, offset)
            .ok_or_else(|| Error::InvalidArgument(format!("day offset out of range: {trimmed}")));
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| {
        Error::InvalidArgument(format!(
            "invalid date '{trimmed}' (expected YYYY-MM-DD, today, tomorrow or +N)"
        ))
    })
}
