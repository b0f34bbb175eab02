mod mocks;

use chrono::{DateTime, NaiveDate, TimeZone};
use chrono_tz::America::Los_Angeles;
use chrono_tz::Tz;
use foodtruck_sync::components::extractor::{ExtractorSettings, ScheduleExtractor};
use foodtruck_sync::components::google_calendar::{
    CalendarIdStore, MissingCalendarPolicy, NewCalendar, ReconcileReport, SyncWindow,
};
use foodtruck_sync::components::schedule::{DateKey, WatermarkStore};
use foodtruck_sync::error::Error;
use foodtruck_sync::pipeline::{RunOutcome, SyncJob, SyncSettings};
use mocks::{CalendarCall, MockBrowser, MockCalendar, MockExtractor};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const CALENDAR_ID: &str = "lobster@group.calendar.google.com";
const PAGE: &str = "<div class=\"schedule\"><h3>Tuesday, November 19</h3></div>";

fn stop(title: &str, start: &str, end: &str) -> Value {
    json!({
        "title": title,
        "location": "Pier 41 Marine Terminal, The Embarcadero, San Francisco, CA 94133, USA",
        "maps_url": "https://maps.google.com/?q=Pier 41 Marine Terminal, The Embarcadero, San Francisco, CA 94133, USA",
        "start_time": start,
        "end_time": end
    })
}

fn pier41() -> Value {
    stop("Pier 41 San Francisco (Cart Only)", "11:30", "20:00")
}

fn midnight(year: i32, month: u32, day: u32) -> DateTime<Tz> {
    Los_Angeles.with_ymd_and_hms(year, month, day, 0, 0, 0).single().unwrap()
}

fn november_window(first: u32, last: u32) -> SyncWindow {
    SyncWindow {
        start: midnight(2024, 11, first),
        end: midnight(2024, 11, last + 1),
    }
}

fn response(locations: Value, dates: &[&str]) -> String {
    json!({ "locations": locations, "dates": dates }).to_string()
}

struct Harness {
    dir: TempDir,
    browser: MockBrowser,
    calendar: MockCalendar,
}

impl Harness {
    fn new(browser: MockBrowser, calendar: MockCalendar) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            browser,
            calendar,
        }
    }

    fn serving(answer: &str, calendar: MockCalendar) -> (Self, MockExtractor) {
        let harness = Self::new(MockBrowser::serving(PAGE), calendar);
        harness.store_calendar_id(CALENDAR_ID);
        (harness, MockExtractor::answering(answer))
    }

    fn calendar_ids(&self) -> CalendarIdStore {
        CalendarIdStore::new(self.dir.path().join("calendar_id.txt"))
    }

    fn watermarks(&self) -> WatermarkStore {
        WatermarkStore::new(self.dir.path().join("watermark.json"))
    }

    fn store_calendar_id(&self, id: &str) {
        self.calendar_ids().write(id).unwrap();
    }

    fn store_watermark(&self, date: &str) {
        self.watermarks().save(date.parse().unwrap()).unwrap();
    }

    fn stored_watermark(&self) -> Option<DateKey> {
        self.watermarks().load().unwrap()
    }

    fn job(&self, extractor: MockExtractor, policy: MissingCalendarPolicy, dry_run: bool) -> SyncJob {
        self.job_on(NaiveDate::from_ymd_opt(2024, 11, 15).unwrap(), extractor, policy, dry_run)
    }

    fn job_on(
        &self,
        reference: NaiveDate,
        extractor: MockExtractor,
        policy: MissingCalendarPolicy,
        dry_run: bool,
    ) -> SyncJob {
        let extractor = ScheduleExtractor::new(
            Arc::new(self.browser.clone()),
            Arc::new(extractor),
            ExtractorSettings {
                vendor_url: "https://vendor.example/locations".to_string(),
                selector: ".schedule".to_string(),
                selector_timeout: Duration::from_secs(5),
            },
        );

        SyncJob::new(
            extractor,
            Arc::new(self.calendar.clone()),
            self.calendar_ids(),
            self.watermarks(),
            SyncSettings {
                city: "San Francisco".to_string(),
                timezone: Los_Angeles,
                reference_date: Some(reference),
                missing_calendar: policy,
                calendar: NewCalendar {
                    summary: "Cousin's Lobster Schedule".to_string(),
                    description: "Cousin's Lobster Locations".to_string(),
                    time_zone: "America/Los_Angeles".to_string(),
                },
                dry_run,
            },
        )
    }
}

fn starts(calendar: &MockCalendar) -> Vec<String> {
    calendar
        .inserted()
        .into_iter()
        .filter_map(|event| event.start.date_time)
        .collect()
}

#[tokio::test]
async fn keeps_only_entries_in_the_city() {
    let answer = response(
        json!({ "11-19": [stop("Oakland: Jack London Square", "11:00", "15:00"), pier41()] }),
        &["11-19"],
    );
    let (harness, extractor) = Harness::serving(&answer, MockCalendar::with_calendar(CALENDAR_ID));

    let report = harness
        .job(extractor, MissingCalendarPolicy::FailFast, false)
        .run()
        .await
        .unwrap();

    let inserted = harness.calendar.inserted();
    assert_eq!(inserted.len(), 1);
    assert_eq!(inserted[0].summary, "Pier 41 San Francisco (Cart Only)");
    assert_eq!(inserted[0].start.date_time.as_deref(), Some("2024-11-19T11:30:00-08:00"));
    assert_eq!(inserted[0].source.title, "Open in Google Maps");

    assert!(harness.calendar.calls().contains(&CalendarCall::List {
        calendar: CALENDAR_ID.to_string(),
        time_min: "2024-11-19T00:00:00-08:00".to_string(),
        time_max: "2024-11-20T00:00:00-08:00".to_string(),
    }));

    assert_eq!(
        report.outcome,
        RunOutcome::Synced {
            calendar_id: CALENDAR_ID.to_string(),
            window: november_window(19, 19),
            report: ReconcileReport {
                inserted: 1,
                ..Default::default()
            },
        }
    );
    assert!(report.watermark_saved);
    assert_eq!(harness.stored_watermark(), Some("11-19".parse().unwrap()));
    assert_eq!(harness.browser.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_extraction_makes_no_calendar_calls() {
    let (harness, extractor) = Harness::serving(
        "I'm sorry, I could not find a schedule on this page.",
        MockCalendar::with_calendar(CALENDAR_ID),
    );

    let err = harness
        .job(extractor, MissingCalendarPolicy::FailFast, false)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Extraction(_)));
    assert!(err.is_terminal_before_sync());
    assert!(harness.calendar.calls().is_empty());
    assert_eq!(harness.stored_watermark(), None);
    assert_eq!(harness.browser.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn extraction_service_failure_is_terminal() {
    let harness = Harness::new(MockBrowser::serving(PAGE), MockCalendar::with_calendar(CALENDAR_ID));
    harness.store_calendar_id(CALENDAR_ID);

    let err = harness
        .job(MockExtractor::failing("HTTP 529 overloaded"), MissingCalendarPolicy::FailFast, false)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Extraction(_)));
    assert!(harness.calendar.calls().is_empty());
}

#[tokio::test]
async fn missing_schedule_element_releases_session() {
    let harness = Harness::new(MockBrowser::without_schedule(), MockCalendar::with_calendar(CALENDAR_ID));
    let extractor = MockExtractor::answering(&response(json!({ "11-19": [pier41()] }), &["11-19"]));
    let prompts = Arc::clone(&extractor.prompts);

    let err = harness
        .job(extractor, MissingCalendarPolicy::FailFast, false)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Session(_)));
    assert!(prompts.lock().unwrap().is_empty());
    assert!(harness.calendar.calls().is_empty());
    assert_eq!(harness.browser.opened.load(Ordering::SeqCst), 1);
    assert_eq!(harness.browser.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn prompt_carries_the_page_markup() {
    let (harness, extractor) = Harness::serving(
        &response(json!({ "11-19": [pier41()] }), &["11-19"]),
        MockCalendar::with_calendar(CALENDAR_ID),
    );
    let prompts = Arc::clone(&extractor.prompts);

    harness
        .job(extractor, MissingCalendarPolicy::FailFast, true)
        .run()
        .await
        .unwrap();

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(PAGE));
}

#[tokio::test]
async fn nothing_in_the_city_is_a_validation_failure() {
    let (harness, extractor) = Harness::serving(
        &response(
            json!({ "11-19": [stop("Oakland: Jack London Square", "11:00", "15:00")] }),
            &["11-19"],
        ),
        MockCalendar::with_calendar(CALENDAR_ID),
    );

    let err = harness
        .job(extractor, MissingCalendarPolicy::FailFast, false)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert!(harness.calendar.calls().is_empty());
    assert_eq!(harness.stored_watermark(), None);
}

#[tokio::test]
async fn malformed_date_key_rejects_the_payload() {
    let (harness, extractor) = Harness::serving(
        &response(json!({ "Nov 19": [pier41()] }), &["Nov 19"]),
        MockCalendar::with_calendar(CALENDAR_ID),
    );

    let err = harness
        .job(extractor, MissingCalendarPolicy::FailFast, false)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert!(harness.calendar.calls().is_empty());
}

#[tokio::test]
async fn watermark_skips_synced_days() {
    let (harness, extractor) = Harness::serving(
        &response(
            json!({ "11-19": [pier41()], "11-21": [pier41()], "11-22": [pier41()] }),
            &["11-19", "11-21", "11-22"],
        ),
        MockCalendar::with_calendar(CALENDAR_ID),
    );
    harness.store_watermark("11-20");

    let report = harness
        .job(extractor, MissingCalendarPolicy::FailFast, false)
        .run()
        .await
        .unwrap();

    assert_eq!(
        starts(&harness.calendar),
        vec!["2024-11-21T11:30:00-08:00", "2024-11-22T11:30:00-08:00"]
    );
    assert!(harness.calendar.calls().contains(&CalendarCall::List {
        calendar: CALENDAR_ID.to_string(),
        time_min: "2024-11-21T00:00:00-08:00".to_string(),
        time_max: "2024-11-23T00:00:00-08:00".to_string(),
    }));
    assert_eq!(report.watermark, Some("11-22".parse().unwrap()));
    assert_eq!(harness.stored_watermark(), Some("11-22".parse().unwrap()));
}

#[tokio::test]
async fn already_synced_schedule_is_a_no_op() {
    let (harness, extractor) = Harness::serving(
        &response(json!({ "11-16": [pier41()], "11-22": [pier41()] }), &["11-16", "11-22"]),
        MockCalendar::with_calendar(CALENDAR_ID),
    );
    harness.store_watermark("11-22");

    let report = harness
        .job(extractor, MissingCalendarPolicy::FailFast, false)
        .run()
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::UpToDate);
    assert!(!report.watermark_saved);
    assert!(harness.calendar.calls().is_empty());
}

#[tokio::test]
async fn watermark_advances_on_observed_dates_without_events() {
    // 11-25 is listed on the page but has no stop in the city
    let (harness, extractor) = Harness::serving(
        &response(
            json!({
                "11-19": [pier41()],
                "11-25": [stop("Oakland: Jack London Square", "11:00", "15:00")]
            }),
            &["11-19", "11-25"],
        ),
        MockCalendar::with_calendar(CALENDAR_ID),
    );
    harness.store_watermark("11-20");

    let report = harness
        .job(extractor, MissingCalendarPolicy::FailFast, false)
        .run()
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::UpToDate);
    assert!(report.watermark_saved);
    assert_eq!(harness.stored_watermark(), Some("11-25".parse().unwrap()));
    assert!(harness.calendar.calls().is_empty());
}

#[tokio::test]
async fn missing_calendar_id_fails_fast() {
    let harness = Harness::new(MockBrowser::serving(PAGE), MockCalendar::with_calendar(CALENDAR_ID));
    let extractor = MockExtractor::answering(&response(json!({ "11-19": [pier41()] }), &["11-19"]));

    let err = harness
        .job(extractor, MissingCalendarPolicy::FailFast, false)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::CalendarNotFound(_)));
    assert!(harness.calendar.calls().is_empty());
    assert_eq!(harness.stored_watermark(), None);
}

#[tokio::test]
async fn stale_calendar_id_fails_fast() {
    let harness = Harness::new(MockBrowser::serving(PAGE), MockCalendar::default());
    harness.store_calendar_id("deleted@group.calendar.google.com");
    let extractor = MockExtractor::answering(&response(json!({ "11-19": [pier41()] }), &["11-19"]));

    let err = harness
        .job(extractor, MissingCalendarPolicy::FailFast, false)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::CalendarNotFound(ref id) if id == "deleted@group.calendar.google.com"));
    assert_eq!(
        harness.calendar.calls(),
        vec![CalendarCall::Get("deleted@group.calendar.google.com".to_string())]
    );
}

#[tokio::test]
async fn create_new_policy_creates_and_remembers_calendar() {
    let harness = Harness::new(MockBrowser::serving(PAGE), MockCalendar::default());
    let extractor = MockExtractor::answering(&response(json!({ "11-19": [pier41()] }), &["11-19"]));

    let report = harness
        .job(extractor, MissingCalendarPolicy::CreateNew, false)
        .run()
        .await
        .unwrap();

    assert_eq!(
        harness.calendar.calls()[0],
        CalendarCall::Create("Cousin's Lobster Schedule".to_string())
    );
    assert_eq!(
        harness.calendar_ids().read().unwrap().as_deref(),
        Some("created@group.calendar.google.com")
    );
    assert!(matches!(report.outcome, RunOutcome::Synced { ref calendar_id, .. } if calendar_id == "created@group.calendar.google.com"));
    assert_eq!(harness.calendar.inserted().len(), 1);
}

#[tokio::test]
async fn item_failures_do_not_stop_the_sync() {
    let calendar = MockCalendar::with_calendar(CALENDAR_ID)
        .with_events(&["old-1", "old-2", "old-3"])
        .failing_delete("old-2")
        .failing_inserts_titled("SPARK");
    let (harness, extractor) = Harness::serving(
        &response(
            json!({
                "11-19": [
                    stop("San Francisco: Equator Coffees", "11:30", "14:30"),
                    stop("San Francisco: SPARK Social SF", "17:00", "20:30")
                ],
                "11-22": [pier41()]
            }),
            &["11-19", "11-22"],
        ),
        calendar,
    );

    let report = harness
        .job(extractor, MissingCalendarPolicy::FailFast, false)
        .run()
        .await
        .unwrap();

    assert_eq!(harness.calendar.deleted(), vec!["old-1", "old-2", "old-3"]);
    assert_eq!(harness.calendar.inserted().len(), 3);
    assert_eq!(
        report.outcome,
        RunOutcome::Synced {
            calendar_id: CALENDAR_ID.to_string(),
            window: november_window(19, 22),
            report: ReconcileReport {
                deleted: 2,
                delete_failures: 1,
                inserted: 2,
                insert_failures: 1,
            },
        }
    );
    assert_eq!(harness.stored_watermark(), Some("11-22".parse().unwrap()));
}

#[tokio::test]
async fn deletes_happen_before_inserts() {
    let calendar = MockCalendar::with_calendar(CALENDAR_ID).with_events(&["old-1"]);
    let (harness, extractor) = Harness::serving(&response(json!({ "11-19": [pier41()] }), &["11-19"]), calendar);

    harness
        .job(extractor, MissingCalendarPolicy::FailFast, false)
        .run()
        .await
        .unwrap();

    let calls = harness.calendar.calls();
    let delete = calls.iter().position(|c| matches!(c, CalendarCall::Delete(_))).unwrap();
    let insert = calls.iter().position(|c| matches!(c, CalendarCall::Insert(_))).unwrap();
    assert!(delete < insert);
}

#[tokio::test]
async fn listing_failure_aborts_before_any_change() {
    let calendar = MockCalendar::with_calendar(CALENDAR_ID).with_events(&["old-1"]).failing_list();
    let (harness, extractor) = Harness::serving(&response(json!({ "11-19": [pier41()] }), &["11-19"]), calendar);

    let err = harness
        .job(extractor, MissingCalendarPolicy::FailFast, false)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::GoogleCalendar(_)));
    assert!(harness.calendar.deleted().is_empty());
    assert!(harness.calendar.inserted().is_empty());
    assert_eq!(harness.stored_watermark(), None);
}

#[tokio::test]
async fn dry_run_touches_nothing() {
    let (harness, extractor) = Harness::serving(
        &response(json!({ "11-19": [pier41()], "11-22": [pier41(), pier41()] }), &["11-19", "11-22"]),
        MockCalendar::with_calendar(CALENDAR_ID),
    );

    let report = harness
        .job(extractor, MissingCalendarPolicy::FailFast, true)
        .run()
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Planned {
            window: november_window(19, 22),
            events: 3
        });
    assert!(!report.watermark_saved);
    assert!(harness.calendar.calls().is_empty());
    assert!(!Path::new(&harness.dir.path().join("watermark.json")).exists());
    assert_eq!(
        fs::read_to_string(harness.dir.path().join("calendar_id.txt")).unwrap(),
        CALENDAR_ID
    );
}

#[tokio::test]
async fn schedule_crossing_new_year_lands_in_both_years() {
    let (harness, extractor) = Harness::serving(
        &response(json!({ "12-30": [pier41()], "01-02": [pier41()] }), &["12-30", "01-02"]),
        MockCalendar::with_calendar(CALENDAR_ID).with_events(&["old-1"]),
    );

    let report = harness
        .job_on(NaiveDate::from_ymd_opt(2024, 12, 20).unwrap(), extractor, MissingCalendarPolicy::FailFast, false)
        .run()
        .await
        .unwrap();

    assert_eq!(
        harness.calendar.calls()[1],
        CalendarCall::List {
            calendar: CALENDAR_ID.to_string(),
            time_min: "2024-12-30T00:00:00-08:00".to_string(),
            time_max: "2025-01-03T00:00:00-08:00".to_string(),
        }
    );
    assert_eq!(
        starts(&harness.calendar),
        vec!["2024-12-30T11:30:00-08:00", "2025-01-02T11:30:00-08:00"]
    );
    assert!(matches!(
        report.outcome,
        RunOutcome::Synced { window, .. } if window.start == midnight(2024, 12, 30) && window.end == midnight(2025, 1, 3)
    ));
}
