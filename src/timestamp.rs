//! Timestamp handling
//!
//! All dates in the store are text of the form `YYYY-MM-DD HH:MM:SS.ffffff`.
//! Ages are whole elapsed days divided by 365, truncated. This ignores leap
//! days, so results drift ahead of calendar age over long spans.

use std::sync::OnceLock;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use crate::{Error, Result};

/// Exact shape of a stored timestamp, fraction of 1 to 6 digits
pub const TIMESTAMP_PATTERN: &str =
    r"^([0-9]{4})-([0-9]{2})-([0-9]{2}) ([0-9]{2}):([0-9]{2}):([0-9]{2})\.([0-9]{1,6})$";

/// Days per "year" in the age approximation
pub const DAYS_PER_YEAR: i64 = 365;

static TIMESTAMP_RE: OnceLock<Regex> = OnceLock::new();

fn timestamp_re() -> &'static Regex {
    TIMESTAMP_RE.get_or_init(|| Regex::new(TIMESTAMP_PATTERN).expect("timestamp pattern is valid"))
}

/// Parse a stored timestamp.
///
/// Anything not shaped exactly like `YYYY-MM-DD HH:MM:SS.ffffff`, or naming
/// an impossible date or time (including second 60), is rejected.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    let invalid = || Error::DateParse(value.to_string());

    let caps = timestamp_re().captures(value).ok_or_else(invalid)?;
    let field = |i: usize| caps[i].parse::<u32>().map_err(|_| invalid());

    let year = caps[1].parse::<i32>().map_err(|_| invalid())?;
    let date = NaiveDate::from_ymd_opt(year, field(2)?, field(3)?).ok_or_else(invalid)?;

    // Right-pad the fraction to microseconds: ".5" is 500000.
    let fraction = &caps[7];
    let micros = fraction.parse::<u32>().map_err(|_| invalid())? * 10u32.pow(6 - fraction.len() as u32);
    let time = NaiveTime::from_hms_micro_opt(field(4)?, field(5)?, field(6)?, micros).ok_or_else(invalid)?;

    Ok(date.and_time(time))
}

/// Whole days in `later - earlier`, rounded toward negative infinity
pub fn elapsed_days(earlier: NaiveDateTime, later: NaiveDateTime) -> i64 {
    let delta = later - earlier;
    let days = delta.num_days();
    // num_days truncates toward zero
    if delta < Duration::days(days) {
        days - 1
    } else {
        days
    }
}

/// Years between two instants using the day/365 rule
pub fn years_between(earlier: NaiveDateTime, later: NaiveDateTime) -> i64 {
    elapsed_days(earlier, later) / DAYS_PER_YEAR
}

/// Current local wall-clock time, without zone
pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}
