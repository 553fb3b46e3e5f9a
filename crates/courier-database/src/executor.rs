//! Async SQLite executor using a dedicated background thread.
//!
//! All statements run on one thread owned by `tokio-rusqlite`; callers
//! await the result without blocking the runtime. Only SQL belongs inside
//! `call()`: subscriber calls and other slow work happen outside.
//!
//! ```ignore
//! let db = AsyncDatabase::open(path).await?;
//! let counts = db.call(|conn| queries::count_events_by_status(conn)).await?;
//! ```

use crate::repositories::{perform_unit_of_work, with_transaction};
use crate::{migrations, queries, DatabaseError, DatabaseResult};
use async_trait::async_trait;
use courier_domain::{
    DomainEvent, EventId, OutboxStore, StatusCounts, StoreError, StoreResult, UnitOfWork,
};
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

/// Convert a tokio_rusqlite::Error to DatabaseError.
fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> DatabaseError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => DatabaseError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => DatabaseError::Connection("Connection closed".to_string()),
        other => DatabaseError::Connection(other.to_string()),
    }
}

/// Async SQLite database with a dedicated executor thread.
///
/// Cloning is cheap; every clone talks to the same thread, so statements
/// are executed one at a time in FIFO order.
#[derive(Clone)]
pub struct AsyncDatabase {
    conn: Connection,
    path: String,
}

impl AsyncDatabase {
    /// Open a database at the given path.
    ///
    /// Creates the file and its parent directory if needed, enables WAL,
    /// and runs pending migrations.
    pub async fn open(path: &Path) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path_str = path.to_string_lossy().to_string();
        info!(path = %path_str, "Opening async database");

        let conn = Connection::open(path)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        let db = Self {
            conn,
            path: path_str,
        };
        db.initialize(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            ",
        )
        .await?;

        info!(path = %db.path, "Async database initialized with WAL mode");
        Ok(db)
    }

    /// Open a private in-memory database. Used by tests.
    pub async fn open_in_memory() -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        let db = Self {
            conn,
            path: ":memory:".to_string(),
        };
        db.initialize("PRAGMA foreign_keys = ON;").await?;
        Ok(db)
    }

    async fn initialize(&self, pragmas: &'static str) -> DatabaseResult<()> {
        self.call(move |conn| {
            conn.execute_batch(pragmas)?;
            migrations::run_migrations(conn)
        })
        .await
    }

    /// Execute a closure on the database connection.
    ///
    /// The closure runs on the dedicated SQLite thread. The caller's task
    /// is parked, not blocked, until the result is ready.
    pub async fn call<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> DatabaseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        // Our result rides inside tokio_rusqlite's Ok; only executor
        // failures come back as its Err.
        let outer_result = self.conn.call(move |conn| Ok(f(conn))).await;

        match outer_result {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    /// Execute a closure inside a transaction: commit on `Ok`, roll back on `Err`.
    pub async fn transaction<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> DatabaseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let outer_result = self
            .conn
            .call(move |conn| Ok(with_transaction(conn, f)))
            .await;

        match outer_result {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    /// Run a use case in one transaction on the executor thread.
    ///
    /// Same contract as [`courier_domain::UnitOfWorkPerformer::perform`]:
    /// `Ok` commits every write, `Err` rolls all of them back and is
    /// returned unchanged.
    pub async fn perform<T, E, F>(&self, use_case: F) -> Result<T, E>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let outer_result = self
            .conn
            .call(move |conn| Ok(perform_unit_of_work(conn, use_case)))
            .await;

        match outer_result {
            Ok(inner) => inner,
            Err(e) => Err(E::from(StoreError::from(from_tokio_rusqlite(e)))),
        }
    }

    /// Get the database file path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check if the database is healthy by executing a simple query.
    pub async fn health_check(&self) -> DatabaseResult<()> {
        self.call(|conn| {
            conn.execute_batch("SELECT 1")?;
            Ok(())
        })
        .await?;
        debug!("Database health check passed");
        Ok(())
    }

    /// Close the database connection.
    ///
    /// Waits for pending operations, then shuts down the executor thread.
    pub async fn close(self) -> DatabaseResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to close database: {:?}", e)))?;
        info!(path = %self.path, "Database closed");
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for AsyncDatabase {
    async fn save(&self, event: &DomainEvent) -> StoreResult<()> {
        let event = event.clone();
        self.transaction(move |conn| queries::save_event(conn, &event).map(|_| ()))
            .await
            .map_err(StoreError::from)
    }

    async fn get_by_id(&self, id: &EventId) -> StoreResult<Option<DomainEvent>> {
        let id = id.clone();
        self.call(move |conn| queries::get_event(conn, &id))
            .await
            .map_err(StoreError::from)
    }

    async fn fetch_undelivered(&self, limit: usize) -> StoreResult<Vec<DomainEvent>> {
        self.transaction(move |conn| queries::list_undelivered_events(conn, limit))
            .await
            .map_err(StoreError::from)
    }

    async fn count_by_status(&self) -> StoreResult<StatusCounts> {
        self.call(queries::count_events_by_status)
            .await
            .map_err(StoreError::from)
    }
}
