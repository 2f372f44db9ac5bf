use chrono::{Datelike, Duration, NaiveDate};

use crate::error::{Error, Result};

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| Error::DateParse(format!("{s}: {e}")))
}

/// Parse an optional date bound. Blank input means "unbounded".
pub fn parse_bound(s: Option<&str>) -> Result<Option<NaiveDate>> {
    match s.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_date(s).map(Some),
    }
}

/// Monday of ISO week `week` in `year`.
///
/// Week 1 is the week containing January 4th. Week numbers outside 1..=53
/// are not rejected here: week 0 lands on the Monday before week 1, which is
/// what `%W`-style labels produced upstream need.
pub fn iso_week_start(year: i32, week: u32) -> Option<NaiveDate> {
    let jan4 = NaiveDate::from_ymd_opt(year, 1, 4)?;
    let weekday = jan4.weekday().number_from_monday() as i64;
    let week1_monday = jan4.checked_sub_signed(Duration::days(weekday - 1))?;
    week1_monday.checked_add_signed(Duration::weeks(week as i64 - 1))
}

/// Number of calendar days in `[start, end]`, inclusive. Zero if reversed.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> u64 {
    if end < start {
        0
    } else {
        (end - start).num_days() as u64 + 1
    }
}
