use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use super::models::{DateKey, DaySchedule, ScheduleEntry};
use crate::utils::time::parse_time;

/// First violation found while validating an extracted schedule
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("expected the locations to be an object keyed by date, got {0}")]
    NotAMapping(&'static str),

    #[error("date key '{0}' is not in MM-DD format")]
    MalformedDateKey(String),

    #[error("no entries matching '{city}' survived validation ({dates_seen} dates extracted)")]
    NoMatchingEntries { city: String, dates_seen: usize },
}

/// Turn the extracted `locations` object into a typed schedule.
///
/// Malformed keys reject the whole payload. Malformed entries and entries
/// outside `city` are dropped, as are days left with nothing.
pub fn validate_schedule(locations: &Value, city: &str) -> Result<DaySchedule, ValidationError> {
    let days = locations
        .as_object()
        .ok_or(ValidationError::NotAMapping(json_kind(locations)))?;

    // Check every key before looking at any entry
    let mut keyed: Vec<(DateKey, &Value)> = Vec::with_capacity(days.len());
    for (key, entries) in days {
        let date = key
            .parse::<DateKey>()
            .map_err(|_| ValidationError::MalformedDateKey(key.clone()))?;
        keyed.push((date, entries));
    }

    let mut schedule = DaySchedule::new();
    for (date, entries) in keyed {
        let Some(entries) = entries.as_array() else {
            debug!(date = %date, "Dropping date whose entries are not a list");
            continue;
        };

        let kept: Vec<ScheduleEntry> = entries
            .iter()
            .filter_map(|raw| match parse_entry(raw) {
                Ok(entry) => Some(entry),
                Err(reason) => {
                    debug!(date = %date, reason = %reason, "Dropping malformed entry");
                    None
                }
            })
            .filter(|entry| {
                let matches = entry.title.contains(city);
                if !matches {
                    debug!(date = %date, title = %entry.title, "Dropping entry outside {}", city);
                }
                matches
            })
            .collect();

        schedule.insert(date, kept);
    }

    if schedule.is_empty() {
        return Err(ValidationError::NoMatchingEntries {
            city: city.to_string(),
            dates_seen: days.len(),
        });
    }

    Ok(schedule)
}

fn parse_entry(raw: &Value) -> Result<ScheduleEntry, String> {
    let fields = raw.as_object().ok_or("entry is not an object")?;

    let title = required(fields, "title")?;
    let location = required(fields, "location")?;
    let maps_url = required(fields, "maps_url")?;
    let start_time = clock(required(fields, "start_time")?).ok_or("start_time is not HH:MM")?;
    let end_time = clock(required(fields, "end_time")?).ok_or("end_time is not HH:MM")?;

    Ok(ScheduleEntry {
        title,
        location,
        maps_url,
        start_time,
        end_time,
    })
}

fn required(fields: &Map<String, Value>, name: &str) -> Result<String, String> {
    match fields.get(name).and_then(Value::as_str).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(format!("missing or empty {}", name)),
    }
}

fn clock(value: String) -> Option<String> {
    parse_time(&value).map(|(hour, minute)| format!("{:02}:{:02}", hour, minute))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
