//! Ordering and history protection.
//!
//! Covered:
//! - stored publications keep non-decreasing `published_at`
//! - an older publication cannot be appended
//! - a publications array that omits or alters stored entries is rejected
//! - a rejected save leaves storage as it was

use super::*;

#[test]
fn publications_are_stored_in_time_order() {
    let db = Database::open_in_memory().unwrap();
    let mut event = factory(&[]).create_event(establishment_payload());
    save(&db, &event).unwrap();

    for (i, at) in [5, 5, 12, 40].into_iter().enumerate() {
        event = event.with_publication(failed_publication(at, &["email"]));
        save(&db, &event).unwrap();
        assert_eq!(load(&db, &event).publications().len(), i + 1);
    }

    let stored = load(&db, &event);
    let times: Vec<_> = stored.publications().iter().map(|p| p.published_at).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn older_publication_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    let event = factory(&[])
        .create_event(establishment_payload())
        .with_publication(failed_publication(50, &["email"]));
    save(&db, &event).unwrap();

    let late = event.with_publication(Publication::succeeded(t(10)));
    assert!(matches!(
        save(&db, &late),
        Err(StoreError::PublicationOutOfOrder { position: 1, .. })
    ));
    assert_eq!(outbox_rows(&db), (1, 1, 1));
}

#[test]
fn passing_only_the_new_attempt_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    let pending = factory(&[]).create_event(establishment_payload());
    let first = pending.with_publication(failed_publication(5, &["email"]));
    save(&db, &first).unwrap();

    let only_new = pending.with_publication(Publication::succeeded(t(10)));
    assert!(matches!(
        save(&db, &only_new),
        Err(StoreError::HistoryRewritten { .. })
    ));
    assert_eq!(load(&db, &pending), first);
}

#[test]
fn shorter_history_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    let pending = factory(&[]).create_event(establishment_payload());
    let two = pending
        .with_publication(failed_publication(5, &["email"]))
        .with_publication(failed_publication(6, &["email"]));
    save(&db, &two).unwrap();

    assert!(matches!(
        save(&db, &pending),
        Err(StoreError::HistoryRewritten { stored: 2, incoming: 0, .. })
    ));
    assert_eq!(outbox_rows(&db), (1, 2, 2));
}

#[test]
fn altered_failure_message_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    let pending = factory(&[]).create_event(establishment_payload());
    save(&db, &pending.with_publication(failed_publication(5, &["email"]))).unwrap();

    let altered = pending
        .with_publication(Publication {
            published_at: t(5),
            failures: vec![SubscriberFailure::new("email", "a different story")],
        })
        .with_publication(Publication::succeeded(t(6)));

    assert!(matches!(
        save(&db, &altered),
        Err(StoreError::HistoryRewritten { .. })
    ));
}

#[test]
fn rejected_save_inside_use_case_rolls_back_other_writes() {
    let db = Database::open_in_memory().unwrap();
    let pending = factory(&[]).create_event(establishment_payload());
    save(&db, &pending.with_publication(failed_publication(5, &["email"]))).unwrap();

    let result: Result<(), StoreError> = db.perform(|uow| {
        uow.conventions.save(&convention(CONVENTION_ID))?;
        uow.outbox.save(&pending)?;
        Ok(())
    });

    assert!(matches!(result, Err(StoreError::HistoryRewritten { .. })));
    assert_eq!(db.with_connection(queries::count_conventions).unwrap(), 0);
}
