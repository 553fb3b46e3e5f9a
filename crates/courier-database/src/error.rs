//! Database error types.

use courier_domain::StoreError;
use thiserror::Error;

/// Database error type.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Executor thread unavailable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be decoded
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Outbox merge rejected the write
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DatabaseError {
    /// Whether SQLite rejected the statement on a constraint (CHECK, UNIQUE,
    /// PRIMARY KEY, FOREIGN KEY, NOT NULL, or a trigger RAISE).
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            Self::Store(StoreError::ConstraintViolation(_)) => true,
            _ => false,
        }
    }
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        if err.is_constraint_violation() {
            return match err {
                DatabaseError::Store(inner) => inner,
                DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(_, Some(message))) => {
                    StoreError::ConstraintViolation(message)
                }
                other => StoreError::ConstraintViolation(other.to_string()),
            };
        }
        match err {
            DatabaseError::Store(inner) => inner,
            DatabaseError::Json(e) => StoreError::CorruptRecord(e.to_string()),
            DatabaseError::InvalidData(message) => StoreError::CorruptRecord(message),
            other => StoreError::backend(other),
        }
    }
}

/// Result type alias using DatabaseError.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn check_failure_maps_to_constraint_violation() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER CHECK (v > 0))")
            .unwrap();
        let err = conn.execute("INSERT INTO t (v) VALUES (0)", []).unwrap_err();

        let err = DatabaseError::from(err);
        assert!(err.is_constraint_violation());
        assert!(matches!(
            StoreError::from(err),
            StoreError::ConstraintViolation(_)
        ));
    }

    #[test]
    fn other_sqlite_errors_map_to_backend() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn.execute("SELECT * FROM missing", []).unwrap_err();
        assert!(matches!(
            StoreError::from(DatabaseError::from(err)),
            StoreError::Backend(_)
        ));
    }

    #[test]
    fn store_errors_pass_through_unchanged() {
        let err = DatabaseError::Store(StoreError::AlreadyDelivered("e1".into()));
        assert!(matches!(
            StoreError::from(err),
            StoreError::AlreadyDelivered(_)
        ));
    }

    #[test]
    fn undecodable_rows_are_corrupt_records() {
        let err = DatabaseError::InvalidData("bad topic".to_string());
        assert!(matches!(StoreError::from(err), StoreError::CorruptRecord(_)));
    }
}
