use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{info, warn};

use crate::components::extractor::ScheduleExtractor;
use crate::components::google_calendar::{
    plan_events, reconcile, resolve_calendar, sync_window, CalendarIdStore, CalendarService,
    MissingCalendarPolicy, NewCalendar, ReconcileReport, SyncWindow,
};
use crate::components::schedule::{apply_watermark, validate_schedule, DateKey, WatermarkStore};
use crate::error::JobResult;

/// Per-run knobs of the sync
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Substring an entry title must contain to be kept
    pub city: String,
    pub timezone: Tz,
    /// Date the schedule's month/day keys are placed around; today in
    /// `timezone` when unset
    pub reference_date: Option<NaiveDate>,
    pub missing_calendar: MissingCalendarPolicy,
    /// Calendar created under `MissingCalendarPolicy::CreateNew`
    pub calendar: NewCalendar,
    pub dry_run: bool,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Nothing newer than the watermark
    UpToDate,
    /// Dry run: what would have been cleared and created
    Planned { window: SyncWindow, events: usize },
    /// Calendar was reconciled
    Synced {
        calendar_id: String,
        window: SyncWindow,
        report: ReconcileReport,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Watermark after the run
    pub watermark: Option<DateKey>,
    /// Whether the watermark file was rewritten
    pub watermark_saved: bool,
}

/// One end-to-end sync: extract, validate, filter, reconcile
pub struct SyncJob {
    extractor: ScheduleExtractor,
    calendar: Arc<dyn CalendarService>,
    calendar_ids: CalendarIdStore,
    watermarks: WatermarkStore,
    settings: SyncSettings,
}

impl SyncJob {
    pub fn new(
        extractor: ScheduleExtractor,
        calendar: Arc<dyn CalendarService>,
        calendar_ids: CalendarIdStore,
        watermarks: WatermarkStore,
        settings: SyncSettings,
    ) -> Self {
        Self {
            extractor,
            calendar,
            calendar_ids,
            watermarks,
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Run the sync once.
    ///
    /// Extraction and validation failures return before the calendar or
    /// the watermark is touched.
    pub async fn run(&self) -> JobResult<RunReport> {
        let raw = self.extractor.extract().await?;
        let schedule = validate_schedule(&raw.locations, &self.settings.city)?;
        info!(
            days = schedule.len(),
            entries = schedule.entry_count(),
            city = %self.settings.city,
            "Validated schedule"
        );

        let stored = self.watermarks.load()?;
        let outcome = apply_watermark(&schedule, &raw.observed_dates(), stored);

        if outcome.schedule.is_empty() {
            info!(
                watermark = ?outcome.watermark.map(|d| d.to_string()),
                "No dates newer than the watermark"
            );
            let watermark_saved = self.persist_watermark(outcome.watermark, outcome.advanced)?;
            return Ok(RunReport {
                outcome: RunOutcome::UpToDate,
                watermark: outcome.watermark,
                watermark_saved,
            });
        }

        let reference = self.reference_date();
        let tz = self.settings.timezone;
        let window = sync_window(&outcome.schedule, reference, tz)?;

        if self.settings.dry_run {
            info!("Dry run: would clear events between {} and {}", window.start, window.end);

            let planned = plan_events(&outcome.schedule, reference, tz)?;
            for (date, event) in &planned {
                match event {
                    Ok(event) => info!(
                        date = %date,
                        start = event.start.date_time.as_deref().unwrap_or_default(),
                        end = event.end.date_time.as_deref().unwrap_or_default(),
                        "Dry run: would create {}",
                        event.summary
                    ),
                    Err(e) => warn!(date = %date, "Dry run: could not build event: {}", e),
                }
            }

            return Ok(RunReport {
                outcome: RunOutcome::Planned {
                    window,
                    events: planned.len(),
                },
                watermark: outcome.watermark,
                watermark_saved: false,
            });
        }

        let calendar_id = resolve_calendar(
            self.calendar.as_ref(),
            &self.calendar_ids,
            self.settings.missing_calendar,
            &self.settings.calendar,
        )
        .await?;

        let report = reconcile(self.calendar.as_ref(), &calendar_id, &outcome.schedule, reference, tz).await?;
        info!(
            calendar = %calendar_id,
            deleted = report.deleted,
            inserted = report.inserted,
            failures = report.delete_failures + report.insert_failures,
            "Calendar synced"
        );

        let watermark_saved = self.persist_watermark(outcome.watermark, outcome.advanced)?;

        Ok(RunReport {
            outcome: RunOutcome::Synced {
                calendar_id,
                window,
                report,
            },
            watermark: outcome.watermark,
            watermark_saved,
        })
    }

    fn reference_date(&self) -> NaiveDate {
        self.settings
            .reference_date
            .unwrap_or_else(|| Utc::now().with_timezone(&self.settings.timezone).date_naive())
    }

    fn persist_watermark(&self, watermark: Option<DateKey>, advanced: bool) -> JobResult<bool> {
        match watermark {
            Some(date) if advanced && !self.settings.dry_run => {
                self.watermarks.save(date)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
