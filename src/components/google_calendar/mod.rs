mod client;
pub mod models;
mod reconciler;
mod store;
pub mod time;
pub mod token;

pub use client::{GoogleCalendarClient, DEFAULT_API_URL};
pub use models::{CalendarEvent, CalendarLookup, NewCalendar, NewEvent};
pub use reconciler::{build_event, plan_events, reconcile, sync_window, ReconcileReport, SyncWindow};
pub use store::{resolve_calendar, CalendarIdStore, MissingCalendarPolicy};
pub use token::{ServiceAccountTokens, StaticToken, TokenProvider};

use crate::error::JobResult;
use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;

/// Calendar operations the sync depends on
#[async_trait]
pub trait CalendarService: Send + Sync {
    /// Look up a calendar by id; a missing calendar is not an error
    async fn get_calendar(&self, calendar_id: &str) -> JobResult<CalendarLookup>;

    /// Create a calendar and return its id
    async fn create_calendar(&self, calendar: &NewCalendar) -> JobResult<String>;

    /// All single events overlapping `[time_min, time_max)`
    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Tz>,
        time_max: DateTime<Tz>,
    ) -> JobResult<Vec<CalendarEvent>>;

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> JobResult<()>;

    async fn insert_event(&self, calendar_id: &str, event: &NewEvent) -> JobResult<CalendarEvent>;
}
