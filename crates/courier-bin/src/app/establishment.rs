//! `courier add-establishment`.

use anyhow::ensure;
use courier_config_and_utils::{Config, Paths};
use courier_database::Database;
use courier_domain::{
    is_valid_siret, AddFormEstablishment, DomainEvent, EventFactory, FormEstablishment,
    RandomUuidGenerator, SystemClock,
};
use std::sync::Arc;

pub async fn add_establishment_command(
    config: &Config,
    paths: &Paths,
    establishment: FormEstablishment,
) -> anyhow::Result<()> {
    ensure!(
        is_valid_siret(&establishment.siret),
        "siret must be 14 digits, got {:?}",
        establishment.siret
    );

    let factory = config.event_factory(Arc::new(SystemClock), Arc::new(RandomUuidGenerator));
    let path = config.database_file(paths);

    let event = tokio::task::spawn_blocking(move || -> anyhow::Result<DomainEvent> {
        let db = Database::open(&path)?;
        add_establishment(&db, factory, establishment)
    })
    .await??;

    println!(
        "Establishment registered, event {} ({}{})",
        event.id(),
        event.topic(),
        if event.was_quarantined() { ", quarantined" } else { "" }
    );
    Ok(())
}

/// Stores the establishment and its announcement in one unit of work.
fn add_establishment(
    db: &Database,
    factory: EventFactory,
    establishment: FormEstablishment,
) -> anyhow::Result<DomainEvent> {
    Ok(AddFormEstablishment::new(factory).execute(db, establishment)?)
}
