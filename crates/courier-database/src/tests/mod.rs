//! Integration tests for the SQLite outbox.
//!
//! Organised by the property each file protects:
//!
//! - `atomicity.rs`     - use case writes commit or roll back together
//! - `merge.rs`         - idempotent re-save and append-only accumulation
//! - `ordering.rs`      - publication order and non-prefix rejection
//! - `quarantine.rs`    - quarantine is decided at creation and sticky
//! - `crawler_store.rs` - the async store seen from the crawler

mod ordering;

use crate::{queries, Database};
use chrono::{DateTime, Duration, TimeZone, Utc};
use courier_domain::{
    Convention, ConventionId, ConventionStatus, CustomClock, DomainEvent, EventFactory,
    EventPayload, FormEstablishmentPayload, Publication, StoreError, SubmitConvention,
    SubscriberFailure, TestUuidGenerator, Topic, UnitOfWorkPerformer,
};
use std::collections::HashSet;
use std::sync::Arc;

pub(crate) const CONVENTION_ID: &str = "11111111-1111-1111-1111-111111111111";

pub(crate) fn t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap() + Duration::seconds(secs)
}

pub(crate) fn factory(quarantined: &[Topic]) -> EventFactory {
    EventFactory::new(
        Arc::new(CustomClock::new(t(0))),
        Arc::new(TestUuidGenerator::new()),
        quarantined.iter().copied().collect::<HashSet<_>>(),
    )
}

pub(crate) fn convention(id: &str) -> Convention {
    Convention {
        id: ConventionId::from(id),
        status: ConventionStatus::ReadyToSign,
        siret: "12345678901234".to_string(),
        agency_id: "agency-1".to_string(),
        beneficiary_name: "Jane Doe".to_string(),
        beneficiary_email: "jane@example.com".to_string(),
    }
}

pub(crate) fn establishment_payload() -> EventPayload {
    EventPayload::FormEstablishmentAdded(FormEstablishmentPayload {
        siret: "12345678901234".to_string(),
        business_name: "Boulangerie".to_string(),
        contact_email: "contact@boulangerie.fr".to_string(),
    })
}

pub(crate) fn failed_publication(at: i64, subscriptions: &[&str]) -> Publication {
    Publication {
        published_at: t(at),
        failures: subscriptions
            .iter()
            .map(|s| SubscriberFailure::new(*s, format!("{s} unavailable")))
            .collect(),
    }
}

/// Saves `event` through a unit of work on `db`.
pub(crate) fn save(db: &Database, event: &DomainEvent) -> Result<(), StoreError> {
    db.perform(|uow| uow.outbox.save(event))
}

pub(crate) fn load(db: &Database, event: &DomainEvent) -> DomainEvent {
    db.with_connection(|conn| queries::get_event(conn, event.id()))
        .unwrap()
        .unwrap()
}

pub(crate) fn outbox_rows(db: &Database) -> (i64, i64, i64) {
    db.with_connection(queries::count_outbox_rows).unwrap()
}

/// Submit a convention, fail delivery once, then deliver.
#[test]
fn basic_workflow() {
    let db = Database::open_in_memory().unwrap();
    let event = SubmitConvention::new(factory(&[]))
        .execute(&db, convention(CONVENTION_ID))
        .unwrap();
    assert_eq!(outbox_rows(&db), (1, 0, 0));

    let attempt = event.with_publication(failed_publication(10, &["email"]));
    save(&db, &attempt).unwrap();

    let delivered = attempt.with_publication(Publication::succeeded(t(20)));
    save(&db, &delivered).unwrap();

    assert_eq!(load(&db, &event), delivered);
    assert!(load(&db, &event).is_delivered());
    assert_eq!(outbox_rows(&db), (1, 2, 1));
}
