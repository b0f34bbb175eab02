use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Weekday};
use chrono_tz::Tz;

use crate::components::schedule::DateKey;
use crate::error::{config_error, JobResult};

/// Parse time string in HH:MM format
pub fn parse_time(time_str: &str) -> Option<(u32, u32)> {
    let parts: Vec<&str> = time_str.trim().split(':').collect();
    if parts.len() != 2 {
        return None;
    }
    let hour = parts[0].parse::<u32>().ok()?;
    let minute = parts[1].parse::<u32>().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

/// Parse a comma separated weekday list such as "mon,thu"
pub fn parse_weekdays(days: &str) -> JobResult<Vec<Weekday>> {
    let mut weekdays = Vec::new();
    for day in days.split(',').map(str::trim).filter(|d| !d.is_empty()) {
        let weekday = day
            .parse::<Weekday>()
            .map_err(|_| config_error(&format!("Invalid weekday '{}'", day)))?;
        if !weekdays.contains(&weekday) {
            weekdays.push(weekday);
        }
    }
    if weekdays.is_empty() {
        return Err(config_error("At least one schedule weekday is required"));
    }
    Ok(weekdays)
}

/// Calculate the next run time strictly after `current_time`.
///
/// Wall-clock times that do not exist on a DST transition day are skipped;
/// ambiguous ones resolve to the earlier instant.
pub fn next_run_time(
    current_time: DateTime<Tz>,
    target_time: &str,
    weekdays: &[Weekday],
) -> Option<DateTime<Tz>> {
    let (hour, minute) = parse_time(target_time)?;
    let tz = current_time.timezone();
    let today = current_time.date_naive();

    // A full week plus today always covers every configured weekday
    for offset in 0..=7 {
        let date = today.checked_add_signed(Duration::days(offset))?;
        if !weekdays.contains(&date.weekday()) {
            continue;
        }
        let naive = date.and_hms_opt(hour, minute, 0)?;
        if let Some(candidate) = tz.from_local_datetime(&naive).earliest() {
            if candidate > current_time {
                return Some(candidate);
            }
        }
    }

    None
}

/// Place a month/day key on the calendar relative to `reference`.
///
/// Each key lands in the year that puts it within six months of the
/// reference date, so a page listing 12-30 and 01-02 in late December
/// resolves to this December and next January. `None` when the key does not
/// exist in that year (02-29 outside leap years).
pub fn resolve_date(key: DateKey, reference: NaiveDate) -> Option<NaiveDate> {
    let month_gap = key.month() as i32 - reference.month() as i32;
    let year = if month_gap < -6 {
        reference.year() + 1
    } else if month_gap > 6 {
        reference.year() - 1
    } else {
        reference.year()
    };
    key.in_year(year)
}
