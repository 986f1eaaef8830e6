//! Release date precision handling
//!
//! Spotify reports album release dates at day, month or year precision.
//! Month and year dates normalize to the last day of their period, so a
//! partial date only counts as on-or-after a checkpoint when some day of its
//! period does.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::error::DateError;

/// Granularity of a release date string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePrecision {
    Day,
    Month,
    Year,
}

impl std::str::FromStr for DatePrecision {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(DatePrecision::Day),
            "month" => Ok(DatePrecision::Month),
            "year" => Ok(DatePrecision::Year),
            other => Err(DateError::UnsupportedPrecision(other.to_string())),
        }
    }
}

impl std::fmt::Display for DatePrecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatePrecision::Day => write!(f, "day"),
            DatePrecision::Month => write!(f, "month"),
            DatePrecision::Year => write!(f, "year"),
        }
    }
}

/// Parse a release date and normalize it to the end of its period
pub fn parse_release_date(value: &str, precision: &str) -> Result<NaiveDate, DateError> {
    let precision: DatePrecision = precision.parse()?;
    let invalid = || DateError::InvalidDate {
        value: value.to_string(),
        precision: precision.to_string(),
    };

    match precision {
        DatePrecision::Day => NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid()),
        DatePrecision::Month => {
            let (year, month) = value.split_once('-').ok_or_else(invalid)?;
            let year: i32 = year.parse().map_err(|_| invalid())?;
            let month: u32 = month.parse().map_err(|_| invalid())?;
            last_day_of_month(year, month).ok_or_else(invalid)
        }
        DatePrecision::Year => {
            let year: i32 = value.parse().map_err(|_| invalid())?;
            NaiveDate::from_ymd_opt(year, 12, 31).ok_or_else(invalid)
        }
    }
}

/// Whether a release is on or after the checkpoint's UTC calendar date
pub fn is_on_or_after(
    release_date: &str,
    precision: &str,
    checkpoint: DateTime<Utc>,
) -> Result<bool, DateError> {
    let released = parse_release_date(release_date, precision)?;
    Ok(released >= checkpoint.date_naive())
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    next.pred_opt()
}
