//! SQLite persistence for the Courier outbox.
//!
//! This crate provides:
//! - Schema migrations for the aggregates and the outbox tables
//! - Query helpers, including `save_event`, which applies the outbox merge
//! - Repository ports bound to one transaction
//! - A synchronous `Database` and an async `AsyncDatabase`, both able to
//!   run a use case inside a single transaction
//!
//! # Architecture
//!
//! ## Unit of work
//!
//! `perform` opens a transaction, builds fresh repositories borrowing it,
//! runs the use case, then commits on `Ok` or rolls back on `Err`:
//!
//! ```ignore
//! let event = db.perform(|uow| {
//!     uow.conventions.save(&convention)?;
//!     uow.outbox.save(&event)?;
//!     Ok::<_, StoreError>(event)
//! })?;
//! ```
//!
//! ## Crawler store
//!
//! `AsyncDatabase` implements `OutboxStore`; every call is its own
//! transaction on the executor thread.
//!
//! # Persisted shape
//!
//! - `outbox_events`: id, topic, payload, occurred_at, was_quarantined
//! - `outbox_publications`: (event_id, position), published_at
//! - `outbox_failures`: (event_id, publication_position, position), subscription_id, error_message

mod db;
mod error;
mod executor;
mod migrations;
pub mod queries;
mod repositories;

#[cfg(test)]
mod tests;

pub use db::Database;
pub use error::{DatabaseError, DatabaseResult};
pub use executor::AsyncDatabase;
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use repositories::{
    unit_of_work, SqliteConventionRepository, SqliteEstablishmentRepository,
    SqliteOutboxRepository,
};
