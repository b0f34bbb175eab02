//! Schedule extraction: capture the vendor's schedule markup in a remote
//! browser and have a language model turn it into JSON.

mod anthropic;
pub mod models;
mod prompt;

pub use anthropic::{AnthropicClient, DEFAULT_API_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
pub use models::RawSchedule;
pub use prompt::build_prompt;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::components::browser::{capture_markup, RemoteBrowser};
use crate::error::{extraction_error, JobResult};

/// A text-generation service that answers a single prompt
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn complete(&self, prompt: &str) -> JobResult<String>;
}

/// Where and how to find the schedule on the vendor page
#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub vendor_url: String,
    pub selector: String,
    pub selector_timeout: Duration,
}

/// Fetches the vendor page and extracts its schedule
#[derive(Clone)]
pub struct ScheduleExtractor {
    browser: Arc<dyn RemoteBrowser>,
    extractor: Arc<dyn TextExtractor>,
    settings: ExtractorSettings,
}

impl ScheduleExtractor {
    pub fn new(
        browser: Arc<dyn RemoteBrowser>,
        extractor: Arc<dyn TextExtractor>,
        settings: ExtractorSettings,
    ) -> Self {
        Self {
            browser,
            extractor,
            settings,
        }
    }

    /// Capture the page and return the raw extracted schedule
    pub async fn extract(&self) -> JobResult<RawSchedule> {
        let markup = capture_markup(
            self.browser.as_ref(),
            &self.settings.vendor_url,
            &self.settings.selector,
            self.settings.selector_timeout,
        )
        .await?;

        let prompt = build_prompt(&markup)?;
        let response = self.extractor.complete(&prompt).await?;

        let raw = parse_extraction(&response)?;
        info!(dates = raw.dates.len(), "Extracted schedule");
        Ok(raw)
    }
}

/// Parse the model's answer into a raw schedule.
///
/// Models occasionally wrap the object in prose or code fences, so the
/// outermost `{...}` span is tried before the whole text.
pub fn parse_extraction(response: &str) -> JobResult<RawSchedule> {
    let document = match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if start < end => serde_json::from_str::<Value>(&response[start..=end]).ok(),
        _ => None,
    }
    .or_else(|| serde_json::from_str::<Value>(response).ok());

    let Some(document) = document else {
        error!("Could not extract valid JSON from response: {}", response);
        return Err(extraction_error("Extraction response is not valid JSON"));
    };
    debug!("Extraction payload: {}", document);

    let locations = document
        .get("locations")
        .cloned()
        .ok_or_else(|| extraction_error("Extraction response has no 'locations' member"))?;

    let dates = document
        .get("dates")
        .and_then(Value::as_array)
        .ok_or_else(|| extraction_error("Extraction response has no 'dates' array"))?
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();

    Ok(RawSchedule { locations, dates })
}
