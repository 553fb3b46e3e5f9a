//! Merge rules for saving an event into the outbox.
//!
//! Every backend computes a [`SavePlan`] with [`plan_save`] and writes only
//! what the plan says. Stored history is never edited:
//!
//! - a new id is inserted;
//! - a known id may only grow its publications by appending, and may turn
//!   its quarantine flag on while it is not delivered;
//! - anything else is rejected before any write happens.

use crate::error::{StoreError, StoreResult};
use crate::event::{DomainEvent, Publication};
use crate::types::EventId;
use chrono::{DateTime, Utc};

/// What a backend must write to persist an incoming event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SavePlan {
    /// Insert the event row followed by `publications` from position 0.
    Insert { publications: Vec<Publication> },
    /// Append `publications` starting at `first_position`, and set the
    /// quarantine flag when `quarantine` is true.
    Append {
        first_position: usize,
        publications: Vec<Publication>,
        quarantine: bool,
    },
    /// Stored state already matches.
    Unchanged,
}

impl SavePlan {
    /// Number of publication rows this plan writes.
    pub fn new_publication_count(&self) -> usize {
        match self {
            Self::Insert { publications } | Self::Append { publications, .. } => publications.len(),
            Self::Unchanged => 0,
        }
    }
}

/// Computes the writes needed to store `incoming` on top of `stored`.
pub fn plan_save(stored: Option<&DomainEvent>, incoming: &DomainEvent) -> StoreResult<SavePlan> {
    let Some(stored) = stored else {
        check_order(incoming.id(), None, incoming.publications(), 0)?;
        return Ok(SavePlan::Insert {
            publications: incoming.publications().to_vec(),
        });
    };

    check_immutable_fields(stored, incoming)?;

    let stored_pubs = stored.publications();
    let incoming_pubs = incoming.publications();
    if incoming_pubs.len() < stored_pubs.len()
        || incoming_pubs[..stored_pubs.len()] != *stored_pubs
    {
        return Err(StoreError::HistoryRewritten {
            event_id: incoming.id().clone(),
            stored: stored_pubs.len(),
            incoming: incoming_pubs.len(),
        });
    }

    let delta = &incoming_pubs[stored_pubs.len()..];
    check_order(
        incoming.id(),
        stored_pubs.last().map(|p| p.published_at),
        delta,
        stored_pubs.len(),
    )?;

    let quarantine = incoming.was_quarantined() && !stored.was_quarantined();
    // Delivered is terminal: it can no longer be quarantined.
    if quarantine && (stored.is_delivered() || incoming.is_delivered()) {
        return Err(StoreError::AlreadyDelivered(incoming.id().clone()));
    }
    if delta.is_empty() && !quarantine {
        return Ok(SavePlan::Unchanged);
    }

    Ok(SavePlan::Append {
        first_position: stored_pubs.len(),
        publications: delta.to_vec(),
        quarantine,
    })
}

/// The event a backend holds after applying the plan for `incoming`.
///
/// Quarantine stays on once stored, whatever `incoming` says.
pub fn merged_event(stored: Option<&DomainEvent>, incoming: &DomainEvent) -> DomainEvent {
    let was_quarantined =
        incoming.was_quarantined() || stored.is_some_and(DomainEvent::was_quarantined);
    DomainEvent::from_parts(
        incoming.id().clone(),
        incoming.occurred_at(),
        incoming.payload().clone(),
        incoming.publications().to_vec(),
        was_quarantined,
    )
}

fn check_immutable_fields(stored: &DomainEvent, incoming: &DomainEvent) -> StoreResult<()> {
    let field = if stored.topic() != incoming.topic() {
        Some("topic")
    } else if stored.payload() != incoming.payload() {
        Some("payload")
    } else if stored.occurred_at() != incoming.occurred_at() {
        Some("occurred_at")
    } else {
        None
    };
    match field {
        Some(field) => Err(StoreError::ImmutableFieldChanged {
            event_id: incoming.id().clone(),
            field,
        }),
        None => Ok(()),
    }
}

fn check_order(
    event_id: &EventId,
    mut previous: Option<DateTime<Utc>>,
    publications: &[Publication],
    first_position: usize,
) -> StoreResult<()> {
    for (offset, publication) in publications.iter().enumerate() {
        if previous.is_some_and(|prev| publication.published_at < prev) {
            return Err(StoreError::PublicationOutOfOrder {
                event_id: event_id.clone(),
                position: first_position + offset,
            });
        }
        previous = Some(publication.published_at);
    }
    Ok(())
}
