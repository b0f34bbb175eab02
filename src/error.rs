use miette::Diagnostic;
use thiserror::Error;

use crate::components::schedule::ValidationError;

/// Main error type for the sync job
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Environment error: {0}")]
    #[diagnostic(code(foodtruck_sync::environment))]
    Environment(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(foodtruck_sync::config))]
    Config(String),

    /// Remote browser unreachable, session refused or selector timeout
    #[error("Browser session error: {0}")]
    #[diagnostic(code(foodtruck_sync::session))]
    Session(String),

    /// Extraction service error or a response that is not the expected JSON
    #[error("Extraction error: {0}")]
    #[diagnostic(code(foodtruck_sync::extraction))]
    Extraction(String),

    #[error("Validation error: {0}")]
    #[diagnostic(
        code(foodtruck_sync::validation),
        help("the vendor page layout may have changed; run with --dry-run and RUST_LOG=debug to inspect the extracted payload")
    )]
    Validation(#[from] ValidationError),

    #[error("Google Calendar API error: {0}")]
    #[diagnostic(code(foodtruck_sync::google_calendar))]
    GoogleCalendar(String),

    #[error("Calendar {0} could not be resolved")]
    #[diagnostic(
        code(foodtruck_sync::calendar_not_found),
        help("check the calendar id file or set MISSING_CALENDAR_POLICY=create-new")
    )]
    CalendarNotFound(String),

    #[error(transparent)]
    #[diagnostic(code(foodtruck_sync::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(foodtruck_sync::serialization))]
    Serialization(String),

    #[error("HTTP error: {0}")]
    #[diagnostic(code(foodtruck_sync::http))]
    Http(#[from] reqwest::Error),

    #[error("Other error: {0}")]
    #[diagnostic(code(foodtruck_sync::other))]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Type alias for Result with our Error type
pub type JobResult<T> = Result<T, Error>;

/// Helper to create environment errors
pub fn env_error(var: &str) -> Error {
    Error::Environment(format!("Missing environment variable: {}", var))
}

/// Helper to create configuration errors
pub fn config_error(message: &str) -> Error {
    Error::Config(message.to_string())
}

/// Helper to create browser session errors
pub fn session_error(message: &str) -> Error {
    Error::Session(message.to_string())
}

/// Helper to create extraction errors
pub fn extraction_error(message: &str) -> Error {
    Error::Extraction(message.to_string())
}

/// Helper to create Google Calendar errors
pub fn google_calendar_error(message: &str) -> Error {
    Error::GoogleCalendar(message.to_string())
}

impl Error {
    /// Whether this error ends the run before any calendar state is touched
    pub fn is_terminal_before_sync(&self) -> bool {
        matches!(
            self,
            Error::Session(_) | Error::Extraction(_) | Error::Validation(_)
        )
    }
}
