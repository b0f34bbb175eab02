use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use crate::components::schedule::{DateKey, ScheduleEntry};

/// Shape the extraction service is asked to produce. Only used to render
/// the JSON schema embedded in the prompt.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionDocument {
    /// Stops keyed by date in MM-DD format
    pub locations: BTreeMap<String, Vec<ScheduleEntry>>,
    /// Every date shown on the page, in MM-DD format
    pub dates: Vec<String>,
}

/// Schedule exactly as returned by the extraction service, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct RawSchedule {
    /// The `locations` member, left untyped for the validator
    pub locations: Value,
    /// The `dates` member
    pub dates: Vec<String>,
}

impl RawSchedule {
    /// Every parseable date the page listed, whatever survives validation
    pub fn observed_dates(&self) -> Vec<DateKey> {
        let mut observed: Vec<DateKey> = self
            .dates
            .iter()
            .filter_map(|raw| match raw.parse::<DateKey>() {
                Ok(date) => Some(date),
                Err(e) => {
                    warn!("Ignoring observed date: {}", e);
                    None
                }
            })
            .collect();

        // Keys of the locations object count as observed too
        if let Some(days) = self.locations.as_object() {
            observed.extend(days.keys().filter_map(|k| k.parse::<DateKey>().ok()));
        }

        observed.sort();
        observed.dedup();
        observed
    }
}
