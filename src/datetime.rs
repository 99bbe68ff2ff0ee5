//! Date/time parsing and formatting for `datetime` and `unixtime` fields.
//!
//! All instants are carried as epoch seconds (`i64`). Spreadsheet dates carry no
//! zone, so they are interpreted in the run's configured offset, as are date
//! strings without an explicit zone.

use crate::error::ConvertError;
use anyhow::Result;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use regex::Regex;
use std::sync::LazyLock;

/// Days between the spreadsheet epoch (1899-12-30) and 1970-01-01.
const SERIAL_EPOCH_DAYS: i64 = 25_569;
const SECONDS_PER_DAY: f64 = 86_400.0;
/// Serials at or beyond this magnitude cannot be truncated to `i64` days safely.
const MAX_SERIAL: f64 = 1e15;

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,4})([-/])(\d{1,2})([-/])(\d{1,2})").expect("valid date regex")
});

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{1,2}):(\d{1,2})(?::(\d{1,2})(?:\.(\d{3}))?)? ?(am|AM|pm|PM)?(Z|[+-]\d{2}:?\d{2})?$",
    )
    .expect("valid time regex")
});

static OFFSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([+-])(\d{2}):?(\d{2})$").expect("valid offset regex"));

/// Parse `Z`, `+HH:MM` or `+HHMM` into a fixed offset.
#[must_use]
pub fn parse_offset(s: &str) -> Option<FixedOffset> {
    if s == "Z" {
        return FixedOffset::east_opt(0);
    }
    let caps = OFFSET_RE.captures(s)?;
    let hours: i32 = caps[2].parse().ok()?;
    let minutes: i32 = caps[3].parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    let seconds = (hours * 60 + minutes) * 60;
    if &caps[1] == "-" {
        FixedOffset::west_opt(seconds)
    } else {
        FixedOffset::east_opt(seconds)
    }
}

/// Parse a date/time string into epoch seconds.
///
/// Accepted shapes: `YYYY-MM-DD` or `YYYY/MM/DD`, optionally followed by a space
/// or `T` and `HH:MM[:SS[.mmm]]`, an optional `am`/`pm` marker and an optional
/// zone (`Z`, `+09:00`, `-0530`). A bare time is taken on 1970-01-01.
/// Without an explicit zone the string is read in `default_tz`.
#[must_use]
pub fn parse_datetime(s: &str, default_tz: FixedOffset) -> Option<i64> {
    let s = s.trim();
    let (date, rest) = match DATE_RE.captures(s) {
        Some(caps) => {
            if caps[2] != caps[4] {
                return None;
            }
            let year: i32 = caps[1].parse().ok()?;
            let month: u32 = caps[3].parse().ok()?;
            let day: u32 = caps[5].parse().ok()?;
            let date = NaiveDate::from_ymd_opt(year, month, day)?;
            let consumed = caps.get(0)?.end();
            (date, &s[consumed..])
        }
        None => (NaiveDate::from_ymd_opt(1970, 1, 1)?, s),
    };

    let had_date = rest.len() != s.len();
    let (time, offset) = if rest.is_empty() {
        if !had_date {
            return None;
        }
        (NaiveTime::MIN, default_tz)
    } else {
        let rest = if had_date {
            rest.strip_prefix(' ').or_else(|| rest.strip_prefix('T'))?
        } else {
            rest
        };
        parse_time(rest, default_tz)?
    };

    let local = NaiveDateTime::new(date, time);
    let instant = offset.from_local_datetime(&local).single()?;
    Some(instant.timestamp())
}

fn parse_time(s: &str, default_tz: FixedOffset) -> Option<(NaiveTime, FixedOffset)> {
    let caps = TIME_RE.captures(s)?;
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    let second: u32 = caps.get(3).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    let milli: u32 = caps.get(4).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    match caps.get(5).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(marker) if marker == "pm" && hour < 12 => hour += 12,
        Some(marker) if marker == "am" && hour == 12 => hour = 0,
        _ => {}
    }
    let time = NaiveTime::from_hms_milli_opt(hour, minute, second, milli)?;
    let offset = match caps.get(6) {
        Some(zone) => parse_offset(zone.as_str())?,
        None => default_tz,
    };
    Some((time, offset))
}

/// Format epoch seconds as `YYYY-MM-DDTHH:MM:SS` followed by `Z` for UTC or
/// `+HHMM`/`-HHMM` otherwise.
///
/// # Errors
/// Fails when the instant is outside the representable range.
pub fn isoformat(epoch: i64, tz: FixedOffset) -> Result<String> {
    let utc = DateTime::from_timestamp(epoch, 0)
        .ok_or_else(|| ConvertError::data(format!("time={epoch}: out of range.")))?;
    let local = utc.with_timezone(&tz);
    let stamp = local.format("%Y-%m-%dT%H:%M:%S");
    let offset = tz.local_minus_utc();
    if offset == 0 {
        return Ok(format!("{stamp}Z"));
    }
    let sign = if offset < 0 { '-' } else { '+' };
    let minutes = offset.abs() / 60;
    Ok(format!("{stamp}{sign}{:02}{:02}", minutes / 60, minutes % 60))
}

/// Convert a spreadsheet date serial (days since 1899-12-30, fraction = time of
/// day) read in `tz` into epoch seconds. Fractions are rounded to the nearest second.
///
/// # Errors
/// Fails when the serial is not finite or the instant does not fit in `i64`.
pub fn serial_to_epoch(serial: f64, tz: FixedOffset) -> Result<i64> {
    let out_of_range = || ConvertError::data(format!("date serial={serial}: out of range."));
    if !serial.is_finite() || serial.abs() >= MAX_SERIAL {
        return Err(out_of_range().into());
    }
    let mut days = serial.trunc() as i64;
    let mut seconds = (serial - serial.trunc()) * SECONDS_PER_DAY;
    if seconds >= SECONDS_PER_DAY {
        seconds = 0.0;
        days += 1;
    }
    let seconds = seconds.round() as i64;
    days.checked_sub(SERIAL_EPOCH_DAYS)
        .and_then(|d| d.checked_mul(86_400))
        .and_then(|s| s.checked_add(seconds))
        .and_then(|s| s.checked_sub(i64::from(tz.local_minus_utc())))
        .ok_or_else(|| out_of_range().into())
}
