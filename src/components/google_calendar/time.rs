use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use crate::error::{Error, JobResult};
use crate::utils::time::parse_time;

/// Place a wall-clock time in `tz`.
///
/// On the DST fall-back day the earlier of the two instants is used; times
/// skipped by spring-forward are an error.
pub fn local_datetime(tz: Tz, naive: NaiveDateTime) -> JobResult<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => Err(Error::GoogleCalendar(format!(
            "{} does not exist in {}",
            naive, tz
        ))),
    }
}

/// Midnight at the start of `date` in `tz`
pub fn start_of_day(tz: Tz, date: NaiveDate) -> JobResult<DateTime<Tz>> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::GoogleCalendar(format!("Cannot build midnight of {}", date)))?;
    local_datetime(tz, midnight)
}

/// `date` at an "HH:MM" clock time in `tz`
pub fn at_clock_time(tz: Tz, date: NaiveDate, clock: &str) -> JobResult<DateTime<Tz>> {
    let (hour, minute) = parse_time(clock)
        .ok_or_else(|| Error::GoogleCalendar(format!("Invalid time '{}'", clock)))?;
    let naive = date
        .and_hms_opt(hour, minute, 0)
        .ok_or_else(|| Error::GoogleCalendar(format!("Invalid time '{}'", clock)))?;
    local_datetime(tz, naive)
}
