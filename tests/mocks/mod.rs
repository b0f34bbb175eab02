#![allow(dead_code)]

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use foodtruck_sync::components::browser::{BrowserSession, RemoteBrowser};
use foodtruck_sync::components::extractor::TextExtractor;
use foodtruck_sync::components::google_calendar::{
    CalendarEvent, CalendarLookup, CalendarService, NewCalendar, NewEvent,
};
use foodtruck_sync::error::{extraction_error, google_calendar_error, session_error, JobResult};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock remote browser serving a fixed page
#[derive(Debug, Clone, Default)]
pub struct MockBrowser {
    markup: Option<String>,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

impl MockBrowser {
    pub fn serving(markup: &str) -> Self {
        Self {
            markup: Some(markup.to_string()),
            ..Default::default()
        }
    }

    /// A page where the schedule element never appears
    pub fn without_schedule() -> Self {
        Self::default()
    }
}

struct MockSession {
    markup: Option<String>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl RemoteBrowser for MockBrowser {
    async fn open_session(&self) -> JobResult<Box<dyn BrowserSession>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            markup: self.markup.clone(),
            closed: Arc::clone(&self.closed),
        }))
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    fn id(&self) -> &str {
        "mock-session"
    }

    async fn navigate(&self, _url: &str) -> JobResult<()> {
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> JobResult<String> {
        match self.markup {
            Some(_) => Ok("element-1".to_string()),
            None => Err(session_error(&format!("Timed out waiting for '{}'", selector))),
        }
    }

    async fn outer_html(&self, _element: &str) -> JobResult<String> {
        Ok(self.markup.clone().unwrap_or_default())
    }

    async fn close(&self) -> JobResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock text extractor answering every prompt with the same text
#[derive(Debug, Clone)]
pub struct MockExtractor {
    response: Result<String, String>,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl MockExtractor {
    pub fn answering(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            prompts: Arc::default(),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            prompts: Arc::default(),
        }
    }
}

#[async_trait]
impl TextExtractor for MockExtractor {
    async fn complete(&self, prompt: &str) -> JobResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.response.clone().map_err(|e| extraction_error(&e))
    }
}

/// A call received by the mock calendar
#[derive(Debug, Clone, PartialEq)]
pub enum CalendarCall {
    Get(String),
    Create(String),
    List { calendar: String, time_min: String, time_max: String },
    Delete(String),
    Insert(NewEvent),
}

#[derive(Debug, Default)]
struct CalendarState {
    calendars: HashSet<String>,
    events: Vec<CalendarEvent>,
    calls: Vec<CalendarCall>,
    fail_list: bool,
    fail_deletes: HashSet<String>,
    fail_inserts_titled: Option<String>,
    next_id: usize,
}

/// Mock calendar service recording every call
#[derive(Debug, Clone, Default)]
pub struct MockCalendar {
    state: Arc<Mutex<CalendarState>>,
}

impl MockCalendar {
    pub fn with_calendar(calendar_id: &str) -> Self {
        let mock = Self::default();
        mock.state.lock().unwrap().calendars.insert(calendar_id.to_string());
        mock
    }

    pub fn with_events(self, ids: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for id in ids {
                state.events.push(CalendarEvent {
                    id: id.to_string(),
                    ..Default::default()
                });
            }
        }
        self
    }

    pub fn failing_list(self) -> Self {
        self.state.lock().unwrap().fail_list = true;
        self
    }

    pub fn failing_delete(self, event_id: &str) -> Self {
        self.state.lock().unwrap().fail_deletes.insert(event_id.to_string());
        self
    }

    pub fn failing_inserts_titled(self, fragment: &str) -> Self {
        self.state.lock().unwrap().fail_inserts_titled = Some(fragment.to_string());
        self
    }

    pub fn calls(&self) -> Vec<CalendarCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn inserted(&self) -> Vec<NewEvent> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                CalendarCall::Insert(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                CalendarCall::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl CalendarService for MockCalendar {
    async fn get_calendar(&self, calendar_id: &str) -> JobResult<CalendarLookup> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(CalendarCall::Get(calendar_id.to_string()));
        if state.calendars.contains(calendar_id) {
            Ok(CalendarLookup::Found(calendar_id.to_string()))
        } else {
            Ok(CalendarLookup::NotFound)
        }
    }

    async fn create_calendar(&self, calendar: &NewCalendar) -> JobResult<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(CalendarCall::Create(calendar.summary.clone()));
        let id = "created@group.calendar.google.com".to_string();
        state.calendars.insert(id.clone());
        Ok(id)
    }

    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Tz>,
        time_max: DateTime<Tz>,
    ) -> JobResult<Vec<CalendarEvent>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(CalendarCall::List {
            calendar: calendar_id.to_string(),
            time_min: time_min.to_rfc3339(),
            time_max: time_max.to_rfc3339(),
        });
        if state.fail_list {
            return Err(google_calendar_error("Failed to fetch events: HTTP 503"));
        }
        Ok(state.events.clone())
    }

    async fn delete_event(&self, _calendar_id: &str, event_id: &str) -> JobResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(CalendarCall::Delete(event_id.to_string()));
        if state.fail_deletes.contains(event_id) {
            return Err(google_calendar_error("Failed to delete event: HTTP 500"));
        }
        state.events.retain(|e| e.id != event_id);
        Ok(())
    }

    async fn insert_event(&self, _calendar_id: &str, event: &NewEvent) -> JobResult<CalendarEvent> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(CalendarCall::Insert(event.clone()));
        if let Some(fragment) = &state.fail_inserts_titled {
            if event.summary.contains(fragment.as_str()) {
                return Err(google_calendar_error("Failed to create event: HTTP 400"));
            }
        }
        state.next_id += 1;
        let created = CalendarEvent {
            id: format!("evt-{}", state.next_id),
            summary: Some(event.summary.clone()),
            ..Default::default()
        };
        state.events.push(created.clone());
        Ok(created)
    }
}
