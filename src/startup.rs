use crate::components::browser::WebDriverBrowser;
use crate::components::extractor::{AnthropicClient, ExtractorSettings, ScheduleExtractor};
use crate::components::google_calendar::{
    CalendarIdStore, GoogleCalendarClient, NewCalendar, ServiceAccountTokens, StaticToken, TokenProvider,
};
use crate::components::schedule::WatermarkStore;
use crate::config::Config;
use crate::error::{Error, JobResult};
use crate::pipeline::{RunOutcome, RunReport, SyncJob, SyncSettings};
use crate::shutdown;
use crate::utils::time::next_run_time;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging with environment-based configuration
pub fn init_logging() -> miette::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Other(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load the job configuration
pub fn load_config() -> miette::Result<Config> {
    match Config::load() {
        Ok(config) => Ok(config),
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Wire the production collaborators into a sync job
pub fn build_job(config: &Config, dry_run: bool) -> JobResult<SyncJob> {
    let browser = WebDriverBrowser::new(&config.webdriver_url, config.browser_api_key.clone())?;
    let model = AnthropicClient::new(config.anthropic_api_key.clone())
        .with_model(config.anthropic_model.clone())
        .with_max_tokens(config.anthropic_max_tokens)
        .with_api_url(config.anthropic_api_url.clone());

    let extractor = ScheduleExtractor::new(
        Arc::new(browser),
        Arc::new(model),
        ExtractorSettings {
            vendor_url: config.vendor_url.clone(),
            selector: config.schedule_selector.clone(),
            selector_timeout: config.selector_timeout(),
        },
    );

    // Dry runs never reach the calendar, so they don't need credentials
    let tokens: Arc<dyn TokenProvider> = if dry_run {
        Arc::new(StaticToken(String::new()))
    } else {
        Arc::new(ServiceAccountTokens::from_file(&config.service_account_path)?)
    };
    let calendar = GoogleCalendarClient::new(tokens)?;

    let settings = SyncSettings {
        city: config.city_filter.clone(),
        timezone: config.timezone,
        reference_date: config.reference_date,
        missing_calendar: config.missing_calendar_policy,
        calendar: NewCalendar {
            summary: config.calendar_name.clone(),
            description: "Cousin's Lobster Locations".to_string(),
            time_zone: config.timezone.name().to_string(),
        },
        dry_run,
    };

    Ok(SyncJob::new(
        extractor,
        Arc::new(calendar),
        CalendarIdStore::new(config.calendar_id_path()),
        WatermarkStore::new(config.watermark_path()),
        settings,
    ))
}

fn log_report(report: &RunReport) {
    let watermark = report.watermark.map(|d| d.to_string()).unwrap_or_default();
    match &report.outcome {
        RunOutcome::UpToDate => info!(watermark = %watermark, saved = report.watermark_saved, "Schedule already synced"),
        RunOutcome::Planned { window, events } => {
            info!(from = %window.start, until = %window.end, events, watermark = %watermark, "Dry run finished")
        }
        RunOutcome::Synced { calendar_id, window, report: sync } => {
            let failures = sync.delete_failures + sync.insert_failures;
            if failures > 0 {
                warn!(calendar = %calendar_id, from = %window.start, failures, "Sync finished with failures");
            } else {
                info!(calendar = %calendar_id, from = %window.start, inserted = sync.inserted, watermark = %watermark, "Sync finished");
            }
        }
    }
}

fn log_failure(e: &Error) {
    if e.is_terminal_before_sync() {
        error!("Run aborted, calendar left untouched: {}", e);
    } else {
        error!("Run failed: {}", e);
    }
}

/// Run the job once and return its result
pub async fn run_once(config: &Config, dry_run: bool) -> miette::Result<()> {
    let job = build_job(config, dry_run)?;
    info!(vendor = %config.vendor_url, dry_run, "Starting sync");

    match job.run().await {
        Ok(report) => {
            log_report(&report);
            Ok(())
        }
        Err(e) => {
            log_failure(&e);
            Err(e.into())
        }
    }
}

/// Run the job on the configured weekdays until a shutdown signal arrives.
///
/// A failed run is logged and the loop waits for the next slot.
pub async fn run_scheduled(config: &Config) -> miette::Result<()> {
    let job = build_job(config, false)?;
    let token = CancellationToken::new();
    shutdown::listen_for_signals(token.clone());

    loop {
        let now = Utc::now().with_timezone(&config.timezone);
        let next = next_run_time(now, &config.schedule_time, &config.schedule_days).ok_or_else(|| {
            Error::Config(format!(
                "No upcoming run for {} on {:?}",
                config.schedule_time, config.schedule_days
            ))
        })?;

        info!("Next sync scheduled for {}", next);
        let wait = (next - now).to_std().unwrap_or_default();

        tokio::select! {
            _ = token.cancelled() => {
                info!("Scheduler stopped");
                return Ok(());
            }
            _ = tokio::time::sleep(wait) => {}
        }

        // A started run always completes so the browser session is released
        match job.run().await {
            Ok(report) => log_report(&report),
            Err(e) => log_failure(&e),
        }

        if token.is_cancelled() {
            info!("Scheduler stopped");
            return Ok(());
        }
    }
}
