use thiserror::Error;
use tutor_core::TutorError;

/// Failures inside the calendar adapter. Only construction errors reach
/// callers; fetch and parse failures degrade to an empty busy list.
#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned HTTP {0}")]
    Status(u16),

    #[error("feed fetch timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("feed parse error: {0}")]
    Parse(String),

    #[error("invalid recurrence rule: {0}")]
    Recurrence(String),

    #[error("calendar configuration error: {0}")]
    Config(#[from] TutorError),
}
