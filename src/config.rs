use crate::components::extractor::{DEFAULT_API_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use crate::components::google_calendar::MissingCalendarPolicy;
use crate::error::{config_error, env_error, JobResult};
use crate::utils::time::{parse_time, parse_weekdays};
use chrono::{NaiveDate, Weekday};
use chrono_tz::Tz;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_SELECTOR: &str = ".schedule";
pub const DEFAULT_SELECTOR_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CITY: &str = "San Francisco";
pub const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";
pub const DEFAULT_SERVICE_ACCOUNT_PATH: &str = "credentials/service-account.json";
pub const DEFAULT_STATE_DIR: &str = "state";
pub const DEFAULT_CALENDAR_NAME: &str = "Cousin's Lobster Schedule";
pub const DEFAULT_SCHEDULE_DAYS: &str = "mon,thu";
pub const DEFAULT_SCHEDULE_TIME: &str = "08:00";

/// Override file read when `FOODTRUCK_CONFIG` is not set
pub const DEFAULT_CONFIG_FILE: &str = "config/job.toml";

const CALENDAR_ID_FILE: &str = "calendar_id.txt";
const WATERMARK_FILE: &str = "watermark.json";

/// Settings for the sync job
#[derive(Debug, Clone)]
pub struct Config {
    /// Anthropic API key
    pub anthropic_api_key: String,
    pub anthropic_model: String,
    pub anthropic_max_tokens: u32,
    pub anthropic_api_url: String,
    /// WebDriver endpoint of the remote browser service
    pub webdriver_url: String,
    /// Remote browser API key, sent as the `token` query parameter
    pub browser_api_key: Option<String>,
    /// Page holding the vendor's schedule
    pub vendor_url: String,
    /// CSS selector of the schedule element
    pub schedule_selector: String,
    pub selector_timeout_secs: u64,
    /// Entries whose title does not contain this are dropped
    pub city_filter: String,
    pub timezone: Tz,
    pub service_account_path: PathBuf,
    /// Directory holding the calendar id and watermark files
    pub state_dir: PathBuf,
    pub missing_calendar_policy: MissingCalendarPolicy,
    /// Name of the calendar created under the create-new policy
    pub calendar_name: String,
    /// Date the schedule's month/day keys are placed around; today when unset
    pub reference_date: Option<NaiveDate>,
    pub schedule_days: Vec<Weekday>,
    /// Wake-up time in scheduled mode, "HH:MM"
    pub schedule_time: String,
}

/// Non-secret settings that `config/job.toml` may override
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileOverrides {
    anthropic_model: Option<String>,
    anthropic_max_tokens: Option<u32>,
    anthropic_api_url: Option<String>,
    webdriver_url: Option<String>,
    vendor_url: Option<String>,
    schedule_selector: Option<String>,
    selector_timeout_secs: Option<u64>,
    city_filter: Option<String>,
    timezone: Option<String>,
    service_account_path: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    missing_calendar_policy: Option<String>,
    calendar_name: Option<String>,
    reference_date: Option<String>,
    schedule_days: Option<String>,
    schedule_time: Option<String>,
}

impl Config {
    /// Load configuration from environment and config file
    pub fn load() -> JobResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let mut config = Self::from_source(|key| env::var(key).ok())?;

        let file = env::var("FOODTRUCK_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        config.apply_file(Path::new(&file))?;

        Ok(config)
    }

    /// Build the configuration from a variable lookup
    pub fn from_source<F>(lookup: F) -> JobResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| var(key).ok_or_else(|| env_error(key));

        // Required environment variables
        let anthropic_api_key = required("ANTHROPIC_API_KEY")?;
        let webdriver_url = required("BROWSER_WEBDRIVER_URL")?;
        let vendor_url = required("VENDOR_URL")?;

        let anthropic_max_tokens = match var("ANTHROPIC_MAX_TOKENS") {
            Some(v) => v
                .parse::<u32>()
                .map_err(|_| config_error("Invalid ANTHROPIC_MAX_TOKENS format"))?,
            None => DEFAULT_MAX_TOKENS,
        };

        let selector_timeout_secs = match var("SELECTOR_TIMEOUT_SECS") {
            Some(v) => v
                .parse::<u64>()
                .map_err(|_| config_error("Invalid SELECTOR_TIMEOUT_SECS format"))?,
            None => DEFAULT_SELECTOR_TIMEOUT_SECS,
        };

        let reference_date = var("SCHEDULE_REFERENCE_DATE").map(|v| parse_date(&v)).transpose()?;

        let timezone = parse_timezone(&var("TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()))?;

        let missing_calendar_policy = match var("MISSING_CALENDAR_POLICY") {
            Some(v) => v.parse()?,
            None => MissingCalendarPolicy::default(),
        };

        let schedule_days = parse_weekdays(&var("SCHEDULE_DAYS").unwrap_or_else(|| DEFAULT_SCHEDULE_DAYS.to_string()))?;
        let schedule_time = checked_time(var("SCHEDULE_TIME").unwrap_or_else(|| DEFAULT_SCHEDULE_TIME.to_string()))?;

        Ok(Config {
            anthropic_api_key,
            anthropic_model: var("ANTHROPIC_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            anthropic_max_tokens,
            anthropic_api_url: var("ANTHROPIC_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            webdriver_url,
            browser_api_key: var("BROWSER_API_KEY"),
            vendor_url,
            schedule_selector: var("SCHEDULE_SELECTOR").unwrap_or_else(|| DEFAULT_SELECTOR.to_string()),
            selector_timeout_secs,
            city_filter: var("CITY_FILTER").unwrap_or_else(|| DEFAULT_CITY.to_string()),
            timezone,
            service_account_path: var("GOOGLE_SERVICE_ACCOUNT_PATH")
                .unwrap_or_else(|| DEFAULT_SERVICE_ACCOUNT_PATH.to_string())
                .into(),
            state_dir: var("STATE_DIR").unwrap_or_else(|| DEFAULT_STATE_DIR.to_string()).into(),
            missing_calendar_policy,
            calendar_name: var("CALENDAR_NAME").unwrap_or_else(|| DEFAULT_CALENDAR_NAME.to_string()),
            reference_date,
            schedule_days,
            schedule_time,
        })
    }

    /// Merge an override file over the current values. A missing file is ignored.
    pub fn apply_file(&mut self, path: &Path) -> JobResult<()> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let overrides: FileOverrides = toml::from_str(&content)?;
        self.apply(overrides)?;
        info!(path = %path.display(), "Applied configuration overrides");
        Ok(())
    }

    fn apply(&mut self, file: FileOverrides) -> JobResult<()> {
        if let Some(v) = file.anthropic_model {
            self.anthropic_model = v;
        }
        if let Some(v) = file.anthropic_max_tokens {
            self.anthropic_max_tokens = v;
        }
        if let Some(v) = file.anthropic_api_url {
            self.anthropic_api_url = v;
        }
        if let Some(v) = file.webdriver_url {
            self.webdriver_url = v;
        }
        if let Some(v) = file.vendor_url {
            self.vendor_url = v;
        }
        if let Some(v) = file.schedule_selector {
            self.schedule_selector = v;
        }
        if let Some(v) = file.selector_timeout_secs {
            self.selector_timeout_secs = v;
        }
        if let Some(v) = file.city_filter {
            self.city_filter = v;
        }
        if let Some(v) = file.timezone {
            self.timezone = parse_timezone(&v)?;
        }
        if let Some(v) = file.service_account_path {
            self.service_account_path = v;
        }
        if let Some(v) = file.state_dir {
            self.state_dir = v;
        }
        if let Some(v) = file.missing_calendar_policy {
            self.missing_calendar_policy = v.parse()?;
        }
        if let Some(v) = file.calendar_name {
            self.calendar_name = v;
        }
        if let Some(v) = file.reference_date {
            self.reference_date = Some(parse_date(&v)?);
        }
        if let Some(v) = file.schedule_days {
            self.schedule_days = parse_weekdays(&v)?;
        }
        if let Some(v) = file.schedule_time {
            self.schedule_time = checked_time(v)?;
        }
        Ok(())
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_secs(self.selector_timeout_secs)
    }

    pub fn calendar_id_path(&self) -> PathBuf {
        self.state_dir.join(CALENDAR_ID_FILE)
    }

    pub fn watermark_path(&self) -> PathBuf {
        self.state_dir.join(WATERMARK_FILE)
    }
}

fn parse_timezone(name: &str) -> JobResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| config_error(&format!("Unknown time zone '{}'", name)))
}

fn parse_date(value: &str) -> JobResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| config_error(&format!("Invalid reference date '{}', expected YYYY-MM-DD", value)))
}

fn checked_time(value: String) -> JobResult<String> {
    match parse_time(&value) {
        Some(_) => Ok(value),
        None => Err(config_error(&format!("Invalid SCHEDULE_TIME '{}', expected HH:MM", value))),
    }
}
