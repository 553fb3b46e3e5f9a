//! Event construction.

use crate::clock::Clock;
use crate::event::{DomainEvent, Publication};
use crate::topic::{EventPayload, Topic};
use crate::types::EventId;
use crate::uuid_generator::UuidGenerator;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Overrides accepted by [`EventFactory::create_event_with`].
///
/// Only replay and reconstruction paths set these.
#[derive(Debug, Clone, Default)]
pub struct CreateEventOptions {
    pub id: Option<EventId>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub publications: Option<Vec<Publication>>,
    pub was_quarantined: Option<bool>,
}

/// Builds new events, deciding quarantine from the topic.
#[derive(Clone)]
pub struct EventFactory {
    clock: Arc<dyn Clock>,
    uuid_generator: Arc<dyn UuidGenerator>,
    quarantined_topics: HashSet<Topic>,
}

impl EventFactory {
    pub fn new(
        clock: Arc<dyn Clock>,
        uuid_generator: Arc<dyn UuidGenerator>,
        quarantined_topics: HashSet<Topic>,
    ) -> Self {
        Self {
            clock,
            uuid_generator,
            quarantined_topics,
        }
    }

    pub fn is_quarantined(&self, topic: Topic) -> bool {
        self.quarantined_topics.contains(&topic)
    }

    pub fn quarantined_topics(&self) -> &HashSet<Topic> {
        &self.quarantined_topics
    }

    pub fn create_event(&self, payload: EventPayload) -> DomainEvent {
        self.create_event_with(payload, CreateEventOptions::default())
    }

    pub fn create_event_with(
        &self,
        payload: EventPayload,
        options: CreateEventOptions,
    ) -> DomainEvent {
        let topic = payload.topic();
        let id = options
            .id
            .unwrap_or_else(|| EventId::from(self.uuid_generator.new_uuid()));
        let occurred_at = options.occurred_at.unwrap_or_else(|| self.clock.now());
        let was_quarantined = options
            .was_quarantined
            .unwrap_or_else(|| self.is_quarantined(topic));

        debug!(event_id = %id, topic = %topic, was_quarantined, "Created event");

        DomainEvent::from_parts(
            id,
            occurred_at,
            payload,
            options.publications.unwrap_or_default(),
            was_quarantined,
        )
    }
}

impl std::fmt::Debug for EventFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFactory")
            .field("quarantined_topics", &self.quarantined_topics)
            .finish_non_exhaustive()
    }
}
