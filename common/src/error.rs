use thiserror::Error;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Whether the engine aborted the write because a concurrent transaction
    /// touched the same keys. Such a write may be re-run as a whole.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Database(err) => is_commit_conflict(&err.to_string()),
            _ => false,
        }
    }

    /// Blank-string guard shared by every write path.
    pub(crate) fn require_text(field: &str, value: &str) -> Result<(), AppError> {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{field} must not be empty")));
        }
        Ok(())
    }
}

pub(crate) fn is_commit_conflict(message: &str) -> bool {
    message.contains("read or write conflict") || message.contains("can be retried")
}
