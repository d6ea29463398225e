//! Error types for sync operations

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Chain node unreachable, timed out, or answered with something unusable
    #[error("RPC unavailable: {0}")]
    RpcUnavailable(String),

    /// Unique-key conflict while writing rows that already exist
    #[error("Store conflict: {0}")]
    StoreConflict(String),

    /// Store failure not explained by a conflict
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A sync invariant would have been broken
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Errors the next scheduler tick is expected to recover from.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::RpcUnavailable(_) | Error::StoreUnavailable(_))
    }
}

impl From<zano_storage_sqlite::Error> for Error {
    fn from(e: zano_storage_sqlite::Error) -> Self {
        if e.is_constraint_violation() {
            return Error::StoreConflict(e.to_string());
        }
        match e {
            zano_storage_sqlite::Error::Validation(msg) => Error::InvariantViolation(msg),
            zano_storage_sqlite::Error::NotFound(what) => {
                Error::InvariantViolation(format!("{} missing", what))
            }
            other => Error::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::RpcUnavailable(format!("request timed out: {}", e))
        } else if e.is_decode() {
            Error::RpcUnavailable(format!("malformed response: {}", e))
        } else {
            Error::RpcUnavailable(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::RpcUnavailable(format!("malformed response: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_validation_maps_to_invariant_violation() {
        let err: Error = zano_storage_sqlite::Error::Validation("backwards".to_string()).into();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn test_storage_failure_maps_to_store_unavailable() {
        let err: Error = zano_storage_sqlite::Error::Storage("disk".to_string()).into();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_constraint_violation_maps_to_conflict() {
        let db = zano_storage_sqlite::Database::open_in_memory().unwrap();
        let conn = db.conn();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY); INSERT INTO t VALUES (1);")
            .unwrap();
        let raw = conn.execute("INSERT INTO t VALUES (1)", []).unwrap_err();
        let err: Error = zano_storage_sqlite::Error::Database(raw).into();
        assert!(matches!(err, Error::StoreConflict(_)));
    }
}
