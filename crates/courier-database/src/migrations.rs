//! Database migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::DatabaseResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_aggregates(conn)?;
    }
    if current_version < 2 {
        migrate_v2_outbox(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

/// Runs `sql` and records `version` in one transaction, so a failing step
/// leaves neither partial schema nor a record behind.
fn apply_migration(conn: &Connection, version: i32, name: &str, sql: &str) -> DatabaseResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(sql)?;
    tx.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    tx.commit()?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: conventions and form establishments.
fn migrate_v1_aggregates(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: aggregates");

    apply_migration(
        conn,
        1,
        "aggregates",
        "
        CREATE TABLE IF NOT EXISTS conventions (
            id TEXT PRIMARY KEY CHECK (
                length(id) = 36
                AND id GLOB '????????-????-????-????-????????????'
                AND id NOT GLOB '*[^0-9a-fA-F-]*'
            ),
            status TEXT NOT NULL,
            siret TEXT NOT NULL,
            agency_id TEXT NOT NULL,
            beneficiary_name TEXT NOT NULL,
            beneficiary_email TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_conventions_siret
            ON conventions(siret);

        CREATE TABLE IF NOT EXISTS form_establishments (
            siret TEXT PRIMARY KEY CHECK (
                length(siret) = 14 AND siret NOT GLOB '*[^0-9]*'
            ),
            business_name TEXT NOT NULL,
            contact_email TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )
}

/// V2: transactional outbox.
///
/// Publications and failures are append-only; triggers reject edits so
/// history cannot be rewritten even by a query that bypasses the merge.
fn migrate_v2_outbox(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v2: outbox");

    apply_migration(
        conn,
        2,
        "outbox",
        "
        CREATE TABLE IF NOT EXISTS outbox_events (
            id TEXT PRIMARY KEY CHECK (
                length(id) = 36
                AND id GLOB '????????-????-????-????-????????????'
                AND id NOT GLOB '*[^0-9a-fA-F-]*'
            ),
            topic TEXT NOT NULL,
            payload TEXT NOT NULL CHECK (json_valid(payload)),
            occurred_at TEXT NOT NULL,
            was_quarantined INTEGER NOT NULL DEFAULT 0 CHECK (was_quarantined IN (0, 1))
        );

        CREATE INDEX IF NOT EXISTS idx_outbox_events_occurred_at
            ON outbox_events(occurred_at);
        CREATE INDEX IF NOT EXISTS idx_outbox_events_topic
            ON outbox_events(topic);

        CREATE TABLE IF NOT EXISTS outbox_publications (
            event_id TEXT NOT NULL REFERENCES outbox_events(id),
            position INTEGER NOT NULL CHECK (position >= 0),
            published_at TEXT NOT NULL,
            PRIMARY KEY (event_id, position)
        );

        CREATE TABLE IF NOT EXISTS outbox_failures (
            event_id TEXT NOT NULL,
            publication_position INTEGER NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            subscription_id TEXT NOT NULL,
            error_message TEXT NOT NULL,
            PRIMARY KEY (event_id, publication_position, position),
            FOREIGN KEY (event_id, publication_position)
                REFERENCES outbox_publications(event_id, position)
        );

        CREATE TRIGGER IF NOT EXISTS outbox_events_immutable
        BEFORE UPDATE OF id, topic, payload, occurred_at ON outbox_events
        BEGIN
            SELECT RAISE(ABORT, 'outbox event fields are immutable');
        END;

        CREATE TRIGGER IF NOT EXISTS outbox_events_quarantine_sticky
        BEFORE UPDATE OF was_quarantined ON outbox_events
        WHEN OLD.was_quarantined = 1 AND NEW.was_quarantined = 0
        BEGIN
            SELECT RAISE(ABORT, 'outbox quarantine cannot be lifted');
        END;

        CREATE TRIGGER IF NOT EXISTS outbox_events_no_delete
        BEFORE DELETE ON outbox_events
        BEGIN
            SELECT RAISE(ABORT, 'outbox events are permanent');
        END;

        CREATE TRIGGER IF NOT EXISTS outbox_publications_append_only_update
        BEFORE UPDATE ON outbox_publications
        BEGIN
            SELECT RAISE(ABORT, 'outbox publications are append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS outbox_publications_append_only_delete
        BEFORE DELETE ON outbox_publications
        BEGIN
            SELECT RAISE(ABORT, 'outbox publications are append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS outbox_failures_append_only_update
        BEFORE UPDATE ON outbox_failures
        BEGIN
            SELECT RAISE(ABORT, 'outbox failures are append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS outbox_failures_append_only_delete
        BEFORE DELETE ON outbox_failures
        BEGIN
            SELECT RAISE(ABORT, 'outbox failures are append-only');
        END;
        ",
    )
}
