//! Synchronous database handle.

use crate::repositories::{perform_unit_of_work, with_transaction};
use crate::{migrations, DatabaseResult};
use courier_domain::{StoreError, UnitOfWork, UnitOfWorkPerformer};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

/// Single-connection database for callers without an async runtime.
///
/// `perform` holds the connection for the duration of the use case.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open a database at the given path, running migrations if needed.
    pub fn open(path: &Path) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        migrations::run_migrations(&conn)?;
        info!(path = %path.display(), "Database opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run read-only or single-statement work on the connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> DatabaseResult<T>) -> DatabaseResult<T> {
        f(&self.conn.lock())
    }

    /// Run `f` in its own transaction.
    pub fn transaction<T>(&self, f: impl FnOnce(&Connection) -> DatabaseResult<T>) -> DatabaseResult<T> {
        with_transaction(&mut self.conn.lock(), f)
    }
}

impl UnitOfWorkPerformer for Database {
    fn perform<T, E, F>(&self, use_case: F) -> Result<T, E>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        perform_unit_of_work(&mut self.conn.lock(), use_case)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("courier.db");

        let db = Database::open(&db_path).unwrap();
        assert!(db_path.exists());
        let counts = db.with_connection(queries::count_events_by_status).unwrap();
        assert_eq!(counts.total(), 0);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("courier.db");

        {
            let db = Database::open(&db_path).unwrap();
            db.transaction(|conn| {
                conn.execute(
                    "INSERT INTO form_establishments (siret, business_name, contact_email)
                     VALUES ('12345678901234', 'Garage', 'g@example.com')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        }

        let db = Database::open(&db_path).unwrap();
        assert_eq!(db.with_connection(queries::count_establishments).unwrap(), 1);
    }
}
