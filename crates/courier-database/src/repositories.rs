//! Repository ports bound to a live transaction.
//!
//! Repositories borrow the transaction's connection for `'tx`, so a
//! [`UnitOfWork`] built here cannot outlive the transaction it writes to.

use crate::{queries, DatabaseError};
use courier_domain::{
    Convention, ConventionId, ConventionRepository, DomainEvent, EstablishmentRepository, EventId,
    FormEstablishment, OutboxRepository, StoreError, StoreResult, UnitOfWork,
};
use rusqlite::Connection;
use tracing::{debug, warn};

pub struct SqliteOutboxRepository<'tx> {
    conn: &'tx Connection,
}

impl<'tx> SqliteOutboxRepository<'tx> {
    pub fn new(conn: &'tx Connection) -> Self {
        Self { conn }
    }
}

impl OutboxRepository for SqliteOutboxRepository<'_> {
    fn save(&mut self, event: &DomainEvent) -> StoreResult<()> {
        queries::save_event(self.conn, event)?;
        Ok(())
    }

    fn get_by_id(&mut self, id: &EventId) -> StoreResult<Option<DomainEvent>> {
        Ok(queries::get_event(self.conn, id)?)
    }
}

pub struct SqliteConventionRepository<'tx> {
    conn: &'tx Connection,
}

impl<'tx> SqliteConventionRepository<'tx> {
    pub fn new(conn: &'tx Connection) -> Self {
        Self { conn }
    }
}

impl ConventionRepository for SqliteConventionRepository<'_> {
    fn save(&mut self, convention: &Convention) -> StoreResult<()> {
        queries::insert_convention(self.conn, convention)?;
        Ok(())
    }

    fn get_by_id(&mut self, id: &ConventionId) -> StoreResult<Option<Convention>> {
        Ok(queries::get_convention(self.conn, id)?)
    }
}

pub struct SqliteEstablishmentRepository<'tx> {
    conn: &'tx Connection,
}

impl<'tx> SqliteEstablishmentRepository<'tx> {
    pub fn new(conn: &'tx Connection) -> Self {
        Self { conn }
    }
}

impl EstablishmentRepository for SqliteEstablishmentRepository<'_> {
    fn save(&mut self, establishment: &FormEstablishment) -> StoreResult<()> {
        queries::upsert_establishment(self.conn, establishment)?;
        Ok(())
    }

    fn get_by_siret(&mut self, siret: &str) -> StoreResult<Option<FormEstablishment>> {
        Ok(queries::get_establishment(self.conn, siret)?)
    }
}

/// Build a unit of work whose every repository writes through `conn`.
pub fn unit_of_work(conn: &Connection) -> UnitOfWork<'_> {
    UnitOfWork {
        outbox: Box::new(SqliteOutboxRepository::new(conn)),
        conventions: Box::new(SqliteConventionRepository::new(conn)),
        establishments: Box::new(SqliteEstablishmentRepository::new(conn)),
    }
}

fn sqlite_error<E: From<StoreError>>(err: rusqlite::Error) -> E {
    E::from(StoreError::from(DatabaseError::from(err)))
}

/// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
///
/// The error from `f` is returned unchanged.
pub(crate) fn with_transaction<T, E, F>(conn: &mut Connection, f: F) -> Result<T, E>
where
    F: FnOnce(&Connection) -> Result<T, E>,
    E: From<StoreError>,
{
    let tx = conn.transaction().map_err(sqlite_error::<E>)?;
    let outcome = {
        let scoped: &Connection = &tx;
        f(scoped)
    };
    match outcome {
        Ok(value) => {
            tx.commit().map_err(sqlite_error::<E>)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                warn!(error = %rollback_err, "Rollback failed");
            } else {
                debug!("Transaction rolled back");
            }
            Err(err)
        }
    }
}

/// Run a use case against a fresh unit of work in one transaction.
pub(crate) fn perform_unit_of_work<T, E, F>(conn: &mut Connection, use_case: F) -> Result<T, E>
where
    F: FnOnce(&mut UnitOfWork<'_>) -> Result<T, E>,
    E: From<StoreError>,
{
    with_transaction(conn, |tx| {
        let mut uow = unit_of_work(tx);
        use_case(&mut uow)
    })
}
