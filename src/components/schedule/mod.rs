//! Typed schedule, its validation and the watermark that tracks what has
//! already been synced.

pub mod models;
mod validator;
mod watermark;

pub use models::{DateKey, DaySchedule, ScheduleEntry};
pub use validator::{validate_schedule, ValidationError};
pub use watermark::{apply_watermark, WatermarkOutcome, WatermarkStore};
