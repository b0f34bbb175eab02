use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use super::models::{CalendarEvent, CalendarLookup, CalendarResource, EventsPage, NewCalendar, NewEvent};
use super::token::TokenProvider;
use super::CalendarService;
use crate::error::{google_calendar_error, JobResult};

pub const DEFAULT_API_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Largest page the events listing accepts
const PAGE_SIZE: &str = "250";

/// Google Calendar v3 REST client
#[derive(Clone)]
pub struct GoogleCalendarClient {
    client: Client,
    base_url: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl GoogleCalendarClient {
    pub fn new(tokens: Arc<dyn TokenProvider>) -> JobResult<Self> {
        Self::with_base_url(tokens, DEFAULT_API_URL)
    }

    pub fn with_base_url(tokens: Arc<dyn TokenProvider>, base_url: &str) -> JobResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| google_calendar_error(&format!("Failed to parse URL: {}", e)))?;
        Ok(Self {
            client: Client::new(),
            base_url,
            tokens,
        })
    }

    /// Build an API URL, percent-encoding each path segment
    fn url(&self, segments: &[&str]) -> JobResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| google_calendar_error("Calendar API URL cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> JobResult<Response> {
        let token = self.tokens.access_token().await?;
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| google_calendar_error(&format!("Failed to {}: {}", action, e)))
    }

    async fn fail(response: Response, action: &str) -> crate::error::Error {
        let status = response.status();
        let error_body = response.text().await.unwrap_or_else(|_| "Could not read error response".to_string());
        google_calendar_error(&format!("Failed to {}: HTTP {} - {}", action, status, error_body))
    }
}

#[async_trait]
impl CalendarService for GoogleCalendarClient {
    async fn get_calendar(&self, calendar_id: &str) -> JobResult<CalendarLookup> {
        let url = self.url(&["calendars", calendar_id])?;
        let response = self.send(self.client.get(url), "fetch calendar").await?;

        match response.status() {
            status if status.is_success() => {
                let calendar: CalendarResource = response
                    .json()
                    .await
                    .map_err(|e| google_calendar_error(&format!("Failed to parse calendar: {}", e)))?;
                Ok(CalendarLookup::Found(calendar.id))
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(CalendarLookup::NotFound),
            _ => Err(Self::fail(response, "fetch calendar").await),
        }
    }

    async fn create_calendar(&self, calendar: &NewCalendar) -> JobResult<String> {
        let url = self.url(&["calendars"])?;
        let response = self
            .send(self.client.post(url).json(calendar), "create calendar")
            .await?;

        if !response.status().is_success() {
            return Err(Self::fail(response, "create calendar").await);
        }

        let created: CalendarResource = response
            .json()
            .await
            .map_err(|e| google_calendar_error(&format!("Failed to parse created calendar: {}", e)))?;
        Ok(created.id)
    }

    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Tz>,
        time_max: DateTime<Tz>,
    ) -> JobResult<Vec<CalendarEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.url(&["calendars", calendar_id, "events"])?;
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("timeMin", &time_min.to_rfc3339())
                    .append_pair("timeMax", &time_max.to_rfc3339())
                    .append_pair("singleEvents", "true")
                    .append_pair("maxResults", PAGE_SIZE);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let response = self.send(self.client.get(url), "fetch events").await?;
            if !response.status().is_success() {
                return Err(Self::fail(response, "fetch events").await);
            }

            let page: EventsPage = response
                .json()
                .await
                .map_err(|e| google_calendar_error(&format!("Failed to parse events response: {}", e)))?;

            debug!(count = page.items.len(), "Fetched events page");
            events.extend(page.items);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(events)
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> JobResult<()> {
        let url = self.url(&["calendars", calendar_id, "events", event_id])?;
        let response = self.send(self.client.delete(url), "delete event").await?;

        // Already gone counts as deleted
        if response.status().is_success() || response.status() == StatusCode::GONE {
            return Ok(());
        }
        Err(Self::fail(response, "delete event").await)
    }

    async fn insert_event(&self, calendar_id: &str, event: &NewEvent) -> JobResult<CalendarEvent> {
        let url = self.url(&["calendars", calendar_id, "events"])?;
        let response = self
            .send(self.client.post(url).json(event), "create event")
            .await?;

        if !response.status().is_success() {
            return Err(Self::fail(response, "create event").await);
        }

        response
            .json()
            .await
            .map_err(|e| google_calendar_error(&format!("Failed to parse created event: {}", e)))
    }
}
