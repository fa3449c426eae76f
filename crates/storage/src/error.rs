use thiserror::Error;
use tutor_core::TutorError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("stored row is unreadable: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        StoreError::NotFound { entity, id }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Map a unique-index violation from a concurrent writer to `Conflict`.
    pub(crate) fn from_write(err: sqlx::Error, what: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(what.into()),
            _ => StoreError::Database(err),
        }
    }
}

impl From<TutorError> for StoreError {
    fn from(err: TutorError) -> Self {
        match err {
            TutorError::Validation(msg) | TutorError::Config(msg) => StoreError::Validation(msg),
            TutorError::Conflict(msg) => StoreError::Conflict(msg),
            TutorError::NotFound { entity, id } => StoreError::NotFound { entity, id },
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
