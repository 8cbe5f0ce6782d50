//! Timestamp normalization.
//!
//! Every timestamp is persisted as a UTC wall-clock value (`TIMESTAMP` without
//! zone). Values entering the system are interpreted in the caller's zone and
//! canonicalized to UTC; values leaving the system are either rendered in the
//! configured display zone (`present`) or as ISO-8601 UTC (`to_external_format`).

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use thiserror::Error;

use shared_models::error::AppError;

/// `YYYY-MM-DD HH:mm:ss`
pub const REFERENCE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const EXTERNAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const TIME_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("'{0}' is not a valid date/time")]
    InvalidTimestamp(String),

    #[error("'{0}' is not a valid date")]
    InvalidDate(String),

    #[error("'{0}' is not a valid time")]
    InvalidTime(String),

    #[error("{0} does not exist in time zone {1}")]
    NonexistentLocalTime(String, String),

    #[error("Unknown time zone '{0}'")]
    UnknownZone(String),
}

impl From<TimestampError> for AppError {
    fn from(err: TimestampError) -> Self {
        AppError::InvalidTimestamp(err.to_string())
    }
}

pub fn parse_zone(name: &str) -> Result<Tz, TimestampError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| TimestampError::UnknownZone(name.to_string()))
}

pub fn parse_date(value: &str) -> Result<NaiveDate, TimestampError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| TimestampError::InvalidDate(value.to_string()))
}

pub fn parse_time(value: &str) -> Result<NaiveTime, TimestampError> {
    let value = value.trim();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(value, format).ok())
        .ok_or_else(|| TimestampError::InvalidTime(value.to_string()))
}

fn parse_naive(value: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Parses a stored value. Naive values are already UTC; values with an
/// explicit offset are converted.
fn parse_reference(value: &str) -> Result<NaiveDateTime, TimestampError> {
    let value = value.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(value) {
        return Ok(with_offset.naive_utc());
    }
    parse_naive(value).ok_or_else(|| TimestampError::InvalidTimestamp(value.to_string()))
}

/// Resolves a wall-clock value in `zone` to UTC. A repeated wall-clock time
/// (DST fall-back) resolves to the earlier instant; a skipped one is an error.
pub fn localize(local: NaiveDateTime, zone: Tz) -> Result<NaiveDateTime, TimestampError> {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(dt) => Ok(dt.naive_utc()),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.naive_utc()),
        LocalResult::None => Err(TimestampError::NonexistentLocalTime(
            local.format(REFERENCE_FORMAT).to_string(),
            zone.name().to_string(),
        )),
    }
}

pub fn canonicalize_naive(local_value: &str, zone: Tz) -> Result<NaiveDateTime, TimestampError> {
    let value = local_value.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(value) {
        return Ok(with_offset.naive_utc());
    }
    let local = parse_naive(value)
        .ok_or_else(|| TimestampError::InvalidTimestamp(value.to_string()))?;
    localize(local, zone)
}

/// Interprets `local_value` as wall-clock time in `zone` and returns the UTC
/// value in `YYYY-MM-DD HH:mm:ss`.
pub fn canonicalize(local_value: &str, zone: Tz) -> Result<String, TimestampError> {
    canonicalize_naive(local_value, zone).map(|utc| utc.format(REFERENCE_FORMAT).to_string())
}

pub fn present_naive(reference: NaiveDateTime, zone: Tz) -> String {
    Utc.from_utc_datetime(&reference)
        .with_timezone(&zone)
        .format(REFERENCE_FORMAT)
        .to_string()
}

/// Renders a stored UTC value in `zone`. Absent input yields `None`.
pub fn present(reference: Option<&str>, zone: Tz) -> Result<Option<String>, TimestampError> {
    match reference {
        None => Ok(None),
        Some(value) => parse_reference(value).map(|utc| Some(present_naive(utc, zone))),
    }
}

pub fn to_external_naive(reference: NaiveDateTime) -> String {
    reference.format(EXTERNAL_FORMAT).to_string()
}

/// ISO-8601 rendering for audit timestamps. Strings that are not timestamps
/// are returned unchanged.
pub fn to_external_format(value: Option<&str>) -> Option<String> {
    value.map(|raw| match parse_reference(raw) {
        Ok(utc) => to_external_naive(utc),
        Err(_) => raw.to_string(),
    })
}

pub fn combine_date_and_time_naive(
    date: &str,
    time: &str,
    zone: Tz,
) -> Result<NaiveDateTime, TimestampError> {
    let date = parse_date(date)?;
    let time = parse_time(time)?;
    localize(date.and_time(time), zone)
}

/// Joins a booking form's separate date and time inputs, entered in `zone`.
pub fn combine_date_and_time(date: &str, time: &str, zone: Tz) -> Result<String, TimestampError> {
    combine_date_and_time_naive(date, time, zone)
        .map(|utc| utc.format(REFERENCE_FORMAT).to_string())
}

/// UTC `[start, end)`.
pub type UtcWindow = (NaiveDateTime, NaiveDateTime);

/// UTC `[start, end)` of a calendar day in `zone`.
pub fn day_bounds(date: NaiveDate, zone: Tz) -> Result<UtcWindow, TimestampError> {
    let next = date
        .succ_opt()
        .ok_or_else(|| TimestampError::InvalidDate(date.to_string()))?;
    Ok((start_of_day(date, zone)?, start_of_day(next, zone)?))
}

/// UTC `[start, end)` covering the inclusive date range `from..=to` in `zone`.
pub fn range_bounds(from: NaiveDate, to: NaiveDate, zone: Tz) -> Result<UtcWindow, TimestampError> {
    let (start, _) = day_bounds(from, zone)?;
    let (_, end) = day_bounds(to, zone)?;
    Ok((start, end))
}

// Some zones skip midnight on DST change days; the day then starts at the
// first wall-clock time that exists.
fn start_of_day(date: NaiveDate, zone: Tz) -> Result<NaiveDateTime, TimestampError> {
    let midnight = date.and_time(NaiveTime::MIN);
    localize(midnight, zone).or_else(|_| localize(midnight + Duration::hours(1), zone))
}

pub fn today_in(zone: Tz) -> NaiveDate {
    Utc::now().with_timezone(&zone).date_naive()
}

pub fn now_reference() -> NaiveDateTime {
    Utc::now().naive_utc()
}
