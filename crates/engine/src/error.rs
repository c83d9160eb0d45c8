use gradepoint_core::CoreError;
use gradepoint_storage::StorageError;
use thiserror::Error;

/// Recoverable failures of grade computation. Callers show "no grade yet"
/// instead of propagating these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GradeError {
    #[error("no rubric has any assignment to compute a grade from")]
    DivisionByZero,

    #[error("score {score} is below every configured grade range")]
    NoMatchingRange { score: f64 },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("grade error: {0}")]
    Grade(#[from] GradeError),

    #[error("notification channel failed for section {section}: {reason}")]
    NotificationChannel { section: usize, reason: String },

    #[error("reference integrity: {0}")]
    ReferenceIntegrity(String),

    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("deletion not found: {0}")]
    DeletionNotFound(String),

    #[error("invalid deletion transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: crate::deletion::DeletionState,
        to: crate::deletion::DeletionState,
    },

    #[error("config error: {0}")]
    Config(String),
}
