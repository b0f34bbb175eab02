pub mod browser;
pub mod extractor;
pub mod google_calendar;
pub mod schedule;
