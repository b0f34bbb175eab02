use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A single stop of the truck on a given day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScheduleEntry {
    /// Stop name as listed by the vendor, e.g. "San Francisco: Marina Green"
    pub title: String,
    /// Street address of the stop
    pub location: String,
    /// Google Maps link for the address
    pub maps_url: String,
    /// Opening time, 24-hour "HH:MM"
    pub start_time: String,
    /// Closing time, 24-hour "HH:MM"
    pub end_time: String,
}

/// Month/day key of a schedule, rendered as "MM-DD".
///
/// Ordering is by month then day, which matches the lexicographic order of
/// the zero-padded string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey {
    month: u32,
    day: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateKeyParseError(pub String);

impl fmt::Display for DateKeyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a MM-DD date key", self.0)
    }
}

impl std::error::Error for DateKeyParseError {}

impl DateKey {
    /// `None` unless the pair is a real calendar day in some year.
    /// 2000 is a leap year, so 02-29 passes and 04-31 does not.
    pub fn new(month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(2000, month, day).map(|_| Self { month, day })
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    /// Resolve the key to a concrete date, `None` for e.g. 02-30
    pub fn in_year(&self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.month, self.day)
    }
}

impl FromStr for DateKey {
    type Err = DateKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || DateKeyParseError(s.to_string());
        let parts: Vec<&str> = s.trim().split('-').collect();
        if parts.len() != 2 {
            return Err(err());
        }
        let numeric = |p: &str| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit());
        if !parts.iter().copied().all(numeric) {
            return Err(err());
        }
        let month = parts[0].parse::<u32>().map_err(|_| err())?;
        let day = parts[1].parse::<u32>().map_err(|_| err())?;
        DateKey::new(month, day).ok_or_else(err)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

impl Serialize for DateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Validated schedule: date key to the stops of that day, in page order.
///
/// Never holds a key with an empty list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaySchedule {
    days: BTreeMap<DateKey, Vec<ScheduleEntry>>,
}

impl DaySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the stops of a day. Empty lists are not stored.
    pub fn insert(&mut self, date: DateKey, entries: Vec<ScheduleEntry>) {
        if entries.is_empty() {
            return;
        }
        self.days.entry(date).or_default().extend(entries);
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Number of days in the schedule
    pub fn len(&self) -> usize {
        self.days.len()
    }

    /// Number of stops across all days
    pub fn entry_count(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }

    pub fn dates(&self) -> impl Iterator<Item = &DateKey> {
        self.days.keys()
    }

    pub fn get(&self, date: &DateKey) -> Option<&[ScheduleEntry]> {
        self.days.get(date).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DateKey, &[ScheduleEntry])> {
        self.days.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Keep only the days strictly after `date`
    pub fn after(&self, date: &DateKey) -> DaySchedule {
        let days = self
            .days
            .iter()
            .filter(|(k, _)| *k > date)
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        DaySchedule { days }
    }
}
