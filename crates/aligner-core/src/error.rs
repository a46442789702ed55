//! Error types for aligner-core.

use thiserror::Error;

/// Result type alias using aligner-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for aligner operations
#[derive(Error, Debug)]
pub enum Error {
    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    // Input validation
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    // Entity extraction (always recovered internally, never surfaced
    // from process_message)
    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Live buffer errors (degrade to "no context")
    #[error("Context buffer unavailable: {0}")]
    BufferUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True when the underlying SQLite error is a UNIQUE/constraint
    /// violation. Used to turn duplicate inserts into "already exists".
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Error::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}
