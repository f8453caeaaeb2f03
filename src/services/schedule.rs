//! Civil date/time handling for the event calendar.
//!
//! Events are stored as UTC instants. Every user-facing date or time string
//! is derived in the committee's fixed civil timezone, never in the server's
//! local timezone — the stored instant carries no locale information.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{AppError, AppResult};

/// All civil strings are interpreted and rendered in this timezone.
pub const FIXED_TZ: Tz = chrono_tz::Europe::Madrid;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

/// Combine a civil `YYYY-MM-DD` date and `HH:MM` time into a UTC instant.
///
/// Ambiguous local times (DST fall-back) resolve to the earlier offset;
/// nonexistent local times (DST spring-forward gap) shift forward one hour.
pub fn combine_civil(date: &str, time: &str) -> AppResult<DateTime<Utc>> {
    let d = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT)
        .map_err(|_| AppError::Validation(format!("Fecha invalida: {}", date)))?;
    let t = NaiveTime::parse_from_str(time.trim(), TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M:%S"))
        .map_err(|_| AppError::Validation(format!("Hora invalida: {}", time)))?;
    let naive = d.and_time(t);

    let local = match FIXED_TZ.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => FIXED_TZ
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .ok_or_else(|| {
                AppError::Validation(format!("Fecha/hora invalida: {} {}", date, time))
            })?,
    };

    Ok(local.with_timezone(&Utc))
}

/// Derive the civil `(date, time)` strings for a stored UTC instant.
pub fn civil_parts(starts_at: NaiveDateTime) -> (String, String) {
    let local = as_utc(starts_at).with_timezone(&FIXED_TZ);
    (
        local.format(DATE_FORMAT).to_string(),
        local.format(TIME_FORMAT).to_string(),
    )
}

/// Reattach the UTC offset to a stored naive instant.
pub fn as_utc(stored: NaiveDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(stored, Utc)
}
