use thiserror::Error;
use tutor_calendar::CalendarError;
use tutor_core::TutorError;
use tutor_notify::NotifyError;
use tutor_storage::StoreError;

use crate::workflow::SessionKey;

#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] TutorError),

    #[error("no reschedule in progress for session {0}")]
    SessionNotFound(SessionKey),

    /// Only raised while wiring services from configuration.
    #[error(transparent)]
    Calendar(#[from] CalendarError),

    /// Only raised while wiring services from configuration.
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

impl SchedulingError {
    pub fn is_validation(&self) -> bool {
        match self {
            SchedulingError::Store(e) => e.is_validation(),
            SchedulingError::Core(e) => e.is_validation(),
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            SchedulingError::Store(e) => e.is_conflict(),
            SchedulingError::Core(e) => e.is_conflict(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            SchedulingError::Store(e) => e.is_not_found(),
            SchedulingError::Core(e) => e.is_not_found(),
            SchedulingError::SessionNotFound(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulingError>;
