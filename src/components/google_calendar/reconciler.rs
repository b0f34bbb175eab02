use chrono::{DateTime, Duration, NaiveDate};
use chrono_tz::Tz;
use tracing::{error, info};

use super::models::{EventDateTime, EventSource, NewEvent, Reminders};
use super::time::{at_clock_time, start_of_day};
use super::CalendarService;
use crate::components::schedule::{DaySchedule, ScheduleEntry};
use crate::error::{Error, JobResult};
use crate::utils::time::resolve_date;

/// Half-open span of calendar time replaced by a sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    /// Midnight of the earliest scheduled day
    pub start: DateTime<Tz>,
    /// Midnight after the latest scheduled day
    pub end: DateTime<Tz>,
}

/// Counts of what a reconciliation did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub deleted: usize,
    pub delete_failures: usize,
    pub inserted: usize,
    pub insert_failures: usize,
}

/// The schedule's days placed on the calendar around `reference`, in date order
pub fn resolve_days(schedule: &DaySchedule, reference: NaiveDate) -> JobResult<Vec<(NaiveDate, &[ScheduleEntry])>> {
    let mut days = schedule
        .iter()
        .map(|(key, entries)| {
            resolve_date(*key, reference)
                .map(|date| (date, entries))
                .ok_or_else(|| Error::GoogleCalendar(format!("{} has no date near {}", key, reference)))
        })
        .collect::<JobResult<Vec<_>>>()?;
    days.sort_by_key(|(date, _)| *date);
    Ok(days)
}

/// Compute `[earliest day 00:00, latest day + 1 00:00)` for the schedule
pub fn sync_window(schedule: &DaySchedule, reference: NaiveDate, tz: Tz) -> JobResult<SyncWindow> {
    let days = resolve_days(schedule, reference)?;
    let (first, last) = days
        .first()
        .zip(days.last())
        .map(|((first, _), (last, _))| (*first, *last))
        .ok_or_else(|| Error::GoogleCalendar("Cannot compute a sync window for an empty schedule".to_string()))?;

    let start = start_of_day(tz, first)?;
    let end = start_of_day(tz, last + Duration::days(1))?;
    Ok(SyncWindow { start, end })
}

/// Build the calendar event for one stop
pub fn build_event(date: NaiveDate, entry: &ScheduleEntry, tz: Tz) -> JobResult<NewEvent> {
    let start = at_clock_time(tz, date, &entry.start_time)?;
    let end = at_clock_time(tz, date, &entry.end_time)?;

    let description = format!("📍 {}\n\n🗺 Maps: {}", entry.location, entry.maps_url);

    Ok(NewEvent {
        summary: entry.title.clone(),
        location: entry.location.clone(),
        description,
        start: EventDateTime {
            date_time: Some(start.to_rfc3339()),
            date: None,
            time_zone: Some(tz.name().to_string()),
        },
        end: EventDateTime {
            date_time: Some(end.to_rfc3339()),
            date: None,
            time_zone: Some(tz.name().to_string()),
        },
        reminders: Reminders { use_default: true },
        source: EventSource {
            url: entry.maps_url.clone(),
            title: "Open in Google Maps".to_string(),
        },
    })
}

/// Every event the schedule produces, in date then page order.
///
/// Stops whose times cannot be placed in `tz` are returned as errors so the
/// caller can count them without dropping the rest.
pub fn plan_events(
    schedule: &DaySchedule,
    reference: NaiveDate,
    tz: Tz,
) -> JobResult<Vec<(NaiveDate, JobResult<NewEvent>)>> {
    let mut planned = Vec::with_capacity(schedule.entry_count());
    for (date, entries) in resolve_days(schedule, reference)? {
        for entry in entries {
            planned.push((date, build_event(date, entry, tz)));
        }
    }
    Ok(planned)
}

/// Replace the calendar's events in the schedule's window with the schedule.
///
/// The window is computed and listed before anything is changed; failure
/// there aborts with the calendar untouched. Individual deletes and inserts
/// are best-effort.
pub async fn reconcile(
    service: &dyn CalendarService,
    calendar_id: &str,
    schedule: &DaySchedule,
    reference: NaiveDate,
    tz: Tz,
) -> JobResult<ReconcileReport> {
    let window = sync_window(schedule, reference, tz)?;
    let planned = plan_events(schedule, reference, tz)?;
    let existing = service.list_events(calendar_id, window.start, window.end).await?;

    let mut report = ReconcileReport::default();

    for event in &existing {
        match service.delete_event(calendar_id, &event.id).await {
            Ok(()) => report.deleted += 1,
            Err(e) => {
                error!(event = %event.id, "Error deleting event: {}", e);
                report.delete_failures += 1;
            }
        }
    }
    info!(
        deleted = report.deleted,
        failed = report.delete_failures,
        "Cleared existing events between {} and {}",
        window.start,
        window.end
    );

    for (date, planned) in planned {
        let inserted = match planned {
            Ok(event) => service.insert_event(calendar_id, &event).await,
            Err(e) => Err(e),
        };
        match inserted {
            Ok(created) => {
                info!(date = %date, link = created.html_link.as_deref().unwrap_or(&created.id), "Created event");
                report.inserted += 1;
            }
            Err(e) => {
                error!(date = %date, "Error creating event: {}", e);
                report.insert_failures += 1;
            }
        }
    }

    Ok(report)
}
