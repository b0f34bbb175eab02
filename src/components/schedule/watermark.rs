use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::models::{DateKey, DaySchedule};
use crate::error::JobResult;

/// On-disk form of the watermark: `{"date": "MM-DD"}`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WatermarkFile {
    date: DateKey,
}

/// Result of filtering a schedule against the stored watermark
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkOutcome {
    /// Days strictly newer than the stored watermark
    pub schedule: DaySchedule,
    /// Watermark to keep after this run
    pub watermark: Option<DateKey>,
    /// True when `watermark` is strictly later than the stored one
    pub advanced: bool,
}

/// Drop already-synced days and compute the next watermark.
///
/// The next watermark reflects every date the extractor observed, including
/// dates that did not survive validation.
pub fn apply_watermark(
    schedule: &DaySchedule,
    observed: &[DateKey],
    stored: Option<DateKey>,
) -> WatermarkOutcome {
    let filtered = match &stored {
        Some(watermark) => schedule.after(watermark),
        None => schedule.clone(),
    };

    let latest_seen = observed.iter().chain(schedule.dates()).max().copied();
    let watermark = stored.max(latest_seen);

    if let Some(held) = stored.filter(|w| holds_back_next_year(*w, observed.iter().chain(schedule.dates()))) {
        warn!(
            watermark = %held,
            "Early-year dates sort before the December watermark and are skipped; clear the watermark file to sync them"
        );
    }

    WatermarkOutcome {
        schedule: filtered,
        advanced: watermark > stored,
        watermark,
    }
}

// Keys carry no year, so a December watermark hides January to June dates.
fn holds_back_next_year<'a>(watermark: DateKey, mut seen: impl Iterator<Item = &'a DateKey>) -> bool {
    watermark.month() == 12 && seen.any(|d| d.month() <= 6)
}

/// File-backed watermark persistence
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    path: PathBuf,
}

impl WatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored watermark. A missing file means nothing was synced yet;
    /// an unreadable one is treated the same way so the next run repairs it.
    pub fn load(&self) -> JobResult<Option<DateKey>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<WatermarkFile>(&content) {
            Ok(file) => Ok(Some(file.date)),
            Err(e) => {
                warn!(path = %self.path.display(), "Ignoring malformed watermark file: {}", e);
                Ok(None)
            }
        }
    }

    /// Write the watermark, replacing the file atomically
    pub fn save(&self, date: DateKey) -> JobResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let body = serde_json::to_string(&WatermarkFile { date })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;

        info!(watermark = %date, "Watermark advanced");
        Ok(())
    }
}
