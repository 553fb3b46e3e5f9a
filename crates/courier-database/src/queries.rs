//! Standalone query functions that work with any Connection.
//!
//! Each function takes a `&Connection` as its first parameter, so it runs
//! equally on a plain connection or inside a `Transaction`.

use crate::{DatabaseError, DatabaseResult};
use chrono::{DateTime, SecondsFormat, Utc};
use courier_domain::{
    plan_save, Convention, ConventionId, ConventionStatus, DomainEvent, EventId, EventPayload,
    EventStatus, FormEstablishment, Publication, SavePlan, StatusCounts, SubscriberFailure,
    SubscriptionId, Topic,
};
use rusqlite::{params, Connection};
use tracing::debug;

/// Formats a timestamp so that it parses back to the same instant and
/// sorts lexicographically in time order.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_timestamp(value: &str) -> DatabaseResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::InvalidData(format!("invalid timestamp {value:?}: {e}")))
}

fn position_to_sql(position: usize) -> DatabaseResult<i64> {
    i64::try_from(position)
        .map_err(|_| DatabaseError::InvalidData(format!("position {position} out of range")))
}

// ==========================================
// Outbox events
// ==========================================

/// Insert the scalar fields of an event. Publications are written separately.
pub fn insert_event(conn: &Connection, event: &DomainEvent) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO outbox_events (id, topic, payload, occurred_at, was_quarantined)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.id().as_str(),
            event.topic().as_str(),
            event.payload().body_json()?,
            format_timestamp(event.occurred_at()),
            event.was_quarantined(),
        ],
    )?;
    Ok(())
}

/// Append publications and their failures starting at `first_position`.
pub fn append_publications(
    conn: &Connection,
    event_id: &EventId,
    first_position: usize,
    publications: &[Publication],
) -> DatabaseResult<()> {
    let mut insert_publication = conn.prepare_cached(
        "INSERT INTO outbox_publications (event_id, position, published_at) VALUES (?1, ?2, ?3)",
    )?;
    let mut insert_failure = conn.prepare_cached(
        "INSERT INTO outbox_failures (event_id, publication_position, position, subscription_id, error_message)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;

    for (offset, publication) in publications.iter().enumerate() {
        let position = position_to_sql(first_position + offset)?;
        insert_publication.execute(params![
            event_id.as_str(),
            position,
            format_timestamp(publication.published_at),
        ])?;
        for (failure_position, failure) in publication.failures.iter().enumerate() {
            insert_failure.execute(params![
                event_id.as_str(),
                position,
                position_to_sql(failure_position)?,
                failure.subscription_id.as_str(),
                failure.error_message,
            ])?;
        }
    }
    Ok(())
}

/// Turn the quarantine flag on. There is no way to turn it off.
pub fn mark_quarantined(conn: &Connection, event_id: &EventId) -> DatabaseResult<()> {
    conn.execute(
        "UPDATE outbox_events SET was_quarantined = 1 WHERE id = ?1",
        params![event_id.as_str()],
    )?;
    Ok(())
}

/// Load an event with its full publication history.
pub fn get_event(conn: &Connection, id: &EventId) -> DatabaseResult<Option<DomainEvent>> {
    let mut stmt = conn.prepare_cached(
        "SELECT topic, payload, occurred_at, was_quarantined FROM outbox_events WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id.as_str()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, bool>(3)?,
        ))
    });

    let (topic, payload, occurred_at, was_quarantined) = match result {
        Ok(row) => row,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let topic: Topic = topic
        .parse()
        .map_err(|e| DatabaseError::InvalidData(format!("event {id}: {e}")))?;
    let payload = EventPayload::from_body_json(topic, &payload).map_err(|e| {
        DatabaseError::InvalidData(format!("event {id}: payload does not match {topic}: {e}"))
    })?;

    Ok(Some(DomainEvent::from_parts(
        id.clone(),
        parse_timestamp(&occurred_at)?,
        payload,
        get_publications(conn, id)?,
        was_quarantined,
    )))
}

/// Publications of an event in storage order, failures attached.
pub fn get_publications(conn: &Connection, event_id: &EventId) -> DatabaseResult<Vec<Publication>> {
    let mut stmt = conn.prepare_cached(
        "SELECT position, published_at FROM outbox_publications
         WHERE event_id = ?1 ORDER BY position ASC",
    )?;
    let rows = stmt
        .query_map(params![event_id.as_str()], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut publications = Vec::with_capacity(rows.len());
    for (expected, (position, published_at)) in rows.into_iter().enumerate() {
        if position != position_to_sql(expected)? {
            return Err(DatabaseError::InvalidData(format!(
                "event {event_id}: publication positions have a gap at {expected}"
            )));
        }
        publications.push(Publication {
            published_at: parse_timestamp(&published_at)?,
            failures: Vec::new(),
        });
    }

    let mut stmt = conn.prepare_cached(
        "SELECT publication_position, subscription_id, error_message FROM outbox_failures
         WHERE event_id = ?1 ORDER BY publication_position ASC, position ASC",
    )?;
    let failures = stmt.query_map(params![event_id.as_str()], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    for failure in failures {
        let (publication_position, subscription_id, error_message) = failure?;
        let publication = usize::try_from(publication_position)
            .ok()
            .and_then(|index| publications.get_mut(index))
            .ok_or_else(|| {
                DatabaseError::InvalidData(format!(
                    "event {event_id}: failure references missing publication {publication_position}"
                ))
            })?;
        publication.failures.push(SubscriberFailure {
            subscription_id: SubscriptionId::from(subscription_id),
            error_message,
        });
    }

    Ok(publications)
}

/// Persist `event` following the outbox merge rules.
///
/// Returns the plan that was applied. Nothing is written when the plan
/// cannot be computed.
pub fn save_event(conn: &Connection, event: &DomainEvent) -> DatabaseResult<SavePlan> {
    let stored = get_event(conn, event.id())?;
    let plan = plan_save(stored.as_ref(), event)?;

    match &plan {
        SavePlan::Insert { publications } => {
            insert_event(conn, event)?;
            append_publications(conn, event.id(), 0, publications)?;
            debug!(
                event_id = %event.id(),
                topic = %event.topic(),
                publications = publications.len(),
                "Inserted outbox event"
            );
        }
        SavePlan::Append {
            first_position,
            publications,
            quarantine,
        } => {
            append_publications(conn, event.id(), *first_position, publications)?;
            if *quarantine {
                mark_quarantined(conn, event.id())?;
            }
            debug!(
                event_id = %event.id(),
                first_position,
                appended = publications.len(),
                quarantine,
                "Merged outbox event"
            );
        }
        SavePlan::Unchanged => {
            debug!(event_id = %event.id(), "Outbox event unchanged");
        }
    }

    Ok(plan)
}

/// Ids of events neither delivered nor quarantined, oldest first.
///
/// An event is delivered when its latest publication has no failures.
pub fn list_undelivered_event_ids(conn: &Connection, limit: usize) -> DatabaseResult<Vec<EventId>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare_cached(
        "SELECT e.id FROM outbox_events e
         WHERE e.was_quarantined = 0
           AND NOT EXISTS (
               SELECT 1 FROM outbox_publications p
               WHERE p.event_id = e.id
                 AND p.position = (
                     SELECT MAX(position) FROM outbox_publications WHERE event_id = e.id
                 )
                 AND NOT EXISTS (
                     SELECT 1 FROM outbox_failures f
                     WHERE f.event_id = p.event_id AND f.publication_position = p.position
                 )
           )
         ORDER BY e.occurred_at ASC, e.id ASC
         LIMIT ?1",
    )?;

    let ids = stmt
        .query_map(params![limit], |row| row.get::<_, String>(0))?
        .map(|row| row.map(EventId::from))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Undelivered, unquarantined events with their history, oldest first.
pub fn list_undelivered_events(conn: &Connection, limit: usize) -> DatabaseResult<Vec<DomainEvent>> {
    let mut events = Vec::new();
    for id in list_undelivered_event_ids(conn, limit)? {
        if let Some(event) = get_event(conn, &id)? {
            events.push(event);
        }
    }
    Ok(events)
}

/// Count events per delivery status.
pub fn count_events_by_status(conn: &Connection) -> DatabaseResult<StatusCounts> {
    let mut stmt = conn.prepare_cached(
        "SELECT e.was_quarantined,
                latest.position,
                (SELECT COUNT(*) FROM outbox_failures f
                 WHERE f.event_id = e.id AND f.publication_position = latest.position)
         FROM outbox_events e
         LEFT JOIN (
             SELECT event_id, MAX(position) AS position
             FROM outbox_publications GROUP BY event_id
         ) latest ON latest.event_id = e.id",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, bool>(0)?,
            row.get::<_, Option<i64>>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    let mut counts = StatusCounts::default();
    for row in rows {
        let (was_quarantined, latest, latest_failures) = row?;
        let status = match latest {
            Some(_) if latest_failures == 0 => EventStatus::Delivered,
            _ if was_quarantined => EventStatus::Quarantined,
            None => EventStatus::Pending,
            Some(_) => EventStatus::PartiallyFailed,
        };
        counts.increment(status);
    }
    Ok(counts)
}

/// Row counts of the three outbox tables: events, publications, failures.
pub fn count_outbox_rows(conn: &Connection) -> DatabaseResult<(i64, i64, i64)> {
    let count = |table: &str| -> DatabaseResult<i64> {
        Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
    };
    Ok((
        count("outbox_events")?,
        count("outbox_publications")?,
        count("outbox_failures")?,
    ))
}

// ==========================================
// Conventions
// ==========================================

/// Insert a new convention.
pub fn insert_convention(conn: &Connection, convention: &Convention) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO conventions (id, status, siret, agency_id, beneficiary_name, beneficiary_email)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            convention.id.as_str(),
            convention.status.as_str(),
            convention.siret,
            convention.agency_id,
            convention.beneficiary_name,
            convention.beneficiary_email,
        ],
    )?;
    Ok(())
}

/// Get a convention by ID.
pub fn get_convention(conn: &Connection, id: &ConventionId) -> DatabaseResult<Option<Convention>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, status, siret, agency_id, beneficiary_name, beneficiary_email
         FROM conventions WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id.as_str()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    });

    match result {
        Ok((id, status, siret, agency_id, beneficiary_name, beneficiary_email)) => {
            let status = ConventionStatus::from_str(&status).ok_or_else(|| {
                DatabaseError::InvalidData(format!("convention {id}: unknown status {status}"))
            })?;
            Ok(Some(Convention {
                id: ConventionId::from_string(id),
                status,
                siret,
                agency_id,
                beneficiary_name,
                beneficiary_email,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn count_conventions(conn: &Connection) -> DatabaseResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM conventions", [], |row| row.get(0))?)
}

// ==========================================
// Form establishments
// ==========================================

/// Insert or replace an establishment keyed by SIRET.
pub fn upsert_establishment(conn: &Connection, establishment: &FormEstablishment) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO form_establishments (siret, business_name, contact_email)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(siret) DO UPDATE SET
            business_name = excluded.business_name,
            contact_email = excluded.contact_email,
            updated_at = datetime('now')",
        params![
            establishment.siret,
            establishment.business_name,
            establishment.contact_email,
        ],
    )?;
    Ok(())
}

/// Get an establishment by SIRET.
pub fn get_establishment(conn: &Connection, siret: &str) -> DatabaseResult<Option<FormEstablishment>> {
    let mut stmt = conn.prepare_cached(
        "SELECT siret, business_name, contact_email FROM form_establishments WHERE siret = ?1",
    )?;

    let result = stmt.query_row(params![siret], |row| {
        Ok(FormEstablishment {
            siret: row.get(0)?,
            business_name: row.get(1)?,
            contact_email: row.get(2)?,
        })
    });

    match result {
        Ok(establishment) => Ok(Some(establishment)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn count_establishments(conn: &Connection) -> DatabaseResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM form_establishments", [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use chrono::{Duration, TimeZone};
    use courier_domain::AgencyPayload;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn t(nanos: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::nanoseconds(nanos)
    }

    fn event(id: &str) -> DomainEvent {
        DomainEvent::from_parts(
            EventId::from(id),
            t(123_456_789),
            EventPayload::AgencyRegistered(AgencyPayload {
                agency_id: "agency-1".to_string(),
                agency_name: "Agency".to_string(),
            }),
            vec![],
            false,
        )
    }

    const ID: &str = "11111111-1111-1111-1111-111111111111";

    #[test]
    fn test_timestamp_round_trip_keeps_nanoseconds() {
        let value = t(1);
        assert_eq!(format_timestamp(value), "2024-01-01T00:00:00.000000001Z");
        assert_eq!(parse_timestamp(&format_timestamp(value)).unwrap(), value);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_save_and_load_event_with_history() {
        let conn = conn();
        let stored = event(ID).with_publication(Publication {
            published_at: t(500),
            failures: vec![
                SubscriberFailure::new("email", "smtp down"),
                SubscriberFailure::new("broadcast", "503"),
            ],
        });

        let plan = save_event(&conn, &stored).unwrap();
        assert_eq!(plan.new_publication_count(), 1);
        assert_eq!(get_event(&conn, stored.id()).unwrap(), Some(stored));
        assert_eq!(count_outbox_rows(&conn).unwrap(), (1, 1, 2));
    }

    #[test]
    fn test_get_missing_event() {
        let conn = conn();
        assert_eq!(get_event(&conn, &EventId::from(ID)).unwrap(), None);
    }

    #[test]
    fn test_unknown_topic_is_invalid_data() {
        let conn = conn();
        conn.execute(
            "INSERT INTO outbox_events (id, topic, payload, occurred_at) VALUES (?1, 'Nope', '{}', ?2)",
            params![ID, format_timestamp(t(0))],
        )
        .unwrap();
        assert!(matches!(
            get_event(&conn, &EventId::from(ID)),
            Err(DatabaseError::InvalidData(_))
        ));
    }

    #[test]
    fn test_undelivered_and_status_counts() {
        let conn = conn();
        let pending = event("22222222-2222-2222-2222-222222222222");
        let delivered = event("33333333-3333-3333-3333-333333333333")
            .with_publication(Publication::succeeded(t(1_000)));
        let quarantined = event("44444444-4444-4444-4444-444444444444")
            .quarantined()
            .unwrap();
        let failing = event("55555555-5555-5555-5555-555555555555").with_publication(
            Publication {
                published_at: t(2_000),
                failures: vec![SubscriberFailure::new("sms", "timeout")],
            },
        );
        for e in [&pending, &delivered, &quarantined, &failing] {
            save_event(&conn, e).unwrap();
        }

        let ids = list_undelivered_event_ids(&conn, 10).unwrap();
        assert_eq!(ids, vec![pending.id().clone(), failing.id().clone()]);
        assert_eq!(list_undelivered_event_ids(&conn, 1).unwrap().len(), 1);

        let counts = count_events_by_status(&conn).unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.delivered, 1);
        assert_eq!(counts.quarantined, 1);
        assert_eq!(counts.partially_failed, 1);
    }

    #[test]
    fn test_convention_round_trip_and_constraints() {
        let conn = conn();
        let convention = Convention {
            id: ConventionId::from(ID),
            status: ConventionStatus::ReadyToSign,
            siret: "12345678901234".to_string(),
            agency_id: "agency-1".to_string(),
            beneficiary_name: "Jane".to_string(),
            beneficiary_email: "jane@example.com".to_string(),
        };
        insert_convention(&conn, &convention).unwrap();
        assert_eq!(get_convention(&conn, &convention.id).unwrap(), Some(convention.clone()));

        let duplicate = insert_convention(&conn, &convention).unwrap_err();
        assert!(duplicate.is_constraint_violation());
        assert_eq!(count_conventions(&conn).unwrap(), 1);
    }

    #[test]
    fn test_establishment_upsert() {
        let conn = conn();
        let mut establishment = FormEstablishment {
            siret: "12345678901234".to_string(),
            business_name: "Garage".to_string(),
            contact_email: "a@example.com".to_string(),
        };
        upsert_establishment(&conn, &establishment).unwrap();
        establishment.business_name = "Garage Martin".to_string();
        upsert_establishment(&conn, &establishment).unwrap();

        assert_eq!(count_establishments(&conn).unwrap(), 1);
        assert_eq!(
            get_establishment(&conn, "12345678901234").unwrap(),
            Some(establishment)
        );

        let bad = FormEstablishment {
            siret: "123".to_string(),
            business_name: "Bad".to_string(),
            contact_email: "b@example.com".to_string(),
        };
        assert!(upsert_establishment(&conn, &bad)
            .unwrap_err()
            .is_constraint_violation());
    }
}
