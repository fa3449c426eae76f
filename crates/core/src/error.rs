use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TutorError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Config error: {0}")]
    Config(String),
}

impl TutorError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        TutorError::Validation(msg.into())
    }

    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        TutorError::Conflict(msg.into())
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        TutorError::NotFound { entity, id }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, TutorError::Validation(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, TutorError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TutorError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, TutorError>;
