//! Error types

use rusqlite::ErrorCode;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage error (generic)
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Unique/primary-key constraint violation.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Error::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: ErrorCode::ConstraintViolation,
                    ..
                },
                _
            ))
        )
    }

    /// SQLITE_BUSY / SQLITE_LOCKED contention.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Error::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked,
                    ..
                },
                _
            ))
        )
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
