//! `courier status` and `courier quarantine`.

use super::open_database;
use anyhow::Context;
use courier_config_and_utils::{Config, Paths};
use courier_database::AsyncDatabase;
use courier_domain::{DomainEvent, EventId, EventStatus, OutboxStore, StatusCounts};
use tracing::info;

pub async fn print_status(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    let db = open_database(config, paths).await?;
    let counts = db.count_by_status().await?;

    println!("Outbox: {}", db.path());
    for line in status_lines(&counts) {
        println!("  {line}");
    }
    Ok(())
}

fn status_lines(counts: &StatusCounts) -> Vec<String> {
    EventStatus::ALL
        .iter()
        .map(|status| format!("{:<17}{}", format!("{}:", status.as_str()), counts.get(*status)))
        .chain(std::iter::once(format!("{:<17}{}", "total:", counts.total())))
        .collect()
}

pub async fn quarantine_command(config: &Config, paths: &Paths, event_id: &str) -> anyhow::Result<()> {
    let db = open_database(config, paths).await?;
    let event = quarantine_event(&db, &EventId::from(event_id)).await?;
    println!("Event {} quarantined ({})", event.id(), event.topic());
    Ok(())
}

/// Flags a stored event so the crawler never delivers it.
async fn quarantine_event(db: &AsyncDatabase, event_id: &EventId) -> anyhow::Result<DomainEvent> {
    let stored = db
        .get_by_id(event_id)
        .await?
        .with_context(|| format!("no event with id {event_id}"))?;
    if stored.was_quarantined() {
        return Ok(stored);
    }

    let quarantined = stored.quarantined()?;
    db.save(&quarantined).await?;
    info!(event_id = %event_id, topic = %quarantined.topic(), "Event quarantined");
    Ok(quarantined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use courier_domain::{AgencyPayload, EventPayload, Publication, StoreError};

    fn agency_event() -> DomainEvent {
        DomainEvent::from_parts(
            EventId::from("6a1f1c2e-8d3b-4f0a-9b7c-1e2d3c4b5a69"),
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
            EventPayload::AgencyRegistered(AgencyPayload {
                agency_id: "agency-1".to_string(),
                agency_name: "Agence Lyon".to_string(),
            }),
            vec![],
            false,
        )
    }

    #[tokio::test]
    async fn quarantine_marks_pending_event() {
        let db = AsyncDatabase::open_in_memory().await.unwrap();
        let event = agency_event();
        db.save(&event).await.unwrap();

        let quarantined = quarantine_event(&db, event.id()).await.unwrap();
        assert!(quarantined.was_quarantined());
        assert!(db.fetch_undelivered(10).await.unwrap().is_empty());
        assert_eq!(db.count_by_status().await.unwrap().quarantined, 1);

        // Repeating is harmless.
        assert!(quarantine_event(&db, event.id()).await.is_ok());
    }

    #[tokio::test]
    async fn quarantine_refuses_delivered_event() {
        let db = AsyncDatabase::open_in_memory().await.unwrap();
        let event = agency_event();
        let delivered = event.with_publication(Publication::succeeded(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 0).unwrap(),
        ));
        db.save(&delivered).await.unwrap();

        let err = quarantine_event(&db, event.id()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::AlreadyDelivered(_))
        ));
    }

    #[tokio::test]
    async fn quarantine_unknown_event_fails() {
        let db = AsyncDatabase::open_in_memory().await.unwrap();
        let err = quarantine_event(&db, &EventId::from("6a1f1c2e-8d3b-4f0a-9b7c-000000000000"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no event with id"));
    }

    #[test]
    fn status_lines_include_total() {
        let mut counts = StatusCounts::default();
        counts.increment(EventStatus::Pending);
        counts.increment(EventStatus::Delivered);
        counts.increment(EventStatus::Delivered);

        let lines = status_lines(&counts);
        assert_eq!(lines.len(), EventStatus::ALL.len() + 1);
        assert_eq!(lines[0], "pending:         1");
        assert_eq!(lines.last().unwrap(), "total:           3");
    }
}
