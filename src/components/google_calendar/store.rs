use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use super::models::{CalendarLookup, NewCalendar};
use super::CalendarService;
use crate::error::{config_error, Error, JobResult};

/// What to do when the persisted calendar id is missing or stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingCalendarPolicy {
    /// Abort the run
    #[default]
    FailFast,
    /// Create a fresh calendar and persist its id
    CreateNew,
}

impl FromStr for MissingCalendarPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-fast" | "fail_fast" | "fail" => Ok(Self::FailFast),
            "create-new" | "create_new" | "create" => Ok(Self::CreateNew),
            other => Err(config_error(&format!("Unknown missing-calendar policy '{}'", other))),
        }
    }
}

/// Plain-text file holding the target calendar id
#[derive(Debug, Clone)]
pub struct CalendarIdStore {
    path: PathBuf,
}

impl CalendarIdStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> JobResult<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let id = content.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write(&self, calendar_id: &str) -> JobResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, calendar_id)?;
        Ok(())
    }
}

/// Resolve the calendar to sync into, applying `policy` when the stored id
/// is absent or no longer exists.
pub async fn resolve_calendar(
    service: &dyn CalendarService,
    store: &CalendarIdStore,
    policy: MissingCalendarPolicy,
    template: &NewCalendar,
) -> JobResult<String> {
    let stored = store.read()?;

    if let Some(id) = &stored {
        match service.get_calendar(id).await? {
            CalendarLookup::Found(id) => {
                info!(calendar = %id, "Using existing calendar");
                return Ok(id);
            }
            CalendarLookup::NotFound => warn!(calendar = %id, "Saved calendar not found"),
        }
    } else {
        warn!(path = %store.path().display(), "No saved calendar id");
    }

    match policy {
        MissingCalendarPolicy::FailFast => Err(Error::CalendarNotFound(
            stored.unwrap_or_else(|| format!("<none in {}>", store.path().display())),
        )),
        MissingCalendarPolicy::CreateNew => {
            let id = service.create_calendar(template).await?;
            store.write(&id)?;
            info!(calendar = %id, "Created new calendar");
            Ok(id)
        }
    }
}
