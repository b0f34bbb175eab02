use schemars::schema_for;

use super::models::ExtractionDocument;
use crate::error::JobResult;

/// Instructions sent with the scraped markup
const PROMPT_TEMPLATE: &str = "You are given the HTML of a food truck's public schedule page.
Extract every stop listed on the page.

Return a JSON object with exactly two members:
- \"locations\": an object whose keys are dates and whose values are arrays of stops. Each stop has
  \"title\" (the stop name as shown, including the city or area prefix), \"location\" (the full street
  address), \"maps_url\" (a Google Maps link for the address, https://maps.google.com/?q=<address> when
  the page has none), \"start_time\" and \"end_time\".
- \"dates\": an array with every date shown on the page, including dates whose stops are in other areas.

Follow these rules:
1. ALL DATES MUST BE IN MM-DD FORMAT WITH TWO DIGITS EACH (e.g. \"11-09\"). DO NOT INCLUDE THE YEAR.
2. ALL TIMES MUST BE IN 24-HOUR HH:MM FORMAT (e.g. \"17:30\"). NEVER USE AM/PM.
3. KEEP STOPS FROM EVERY CITY; DO NOT FILTER OR RENAME THEM.
4. OUTPUT ONLY THE JSON OBJECT. NO PROSE, NO MARKDOWN FENCES.

The output must validate against this JSON schema:
{schema}

Schedule HTML:
{markup}";

/// Build the extraction prompt for the captured schedule markup
pub fn build_prompt(markup: &str) -> JobResult<String> {
    let schema = serde_json::to_string_pretty(&schema_for!(ExtractionDocument))?;

    Ok(PROMPT_TEMPLATE
        .replace("{schema}", &schema)
        .replace("{markup}", markup))
}
