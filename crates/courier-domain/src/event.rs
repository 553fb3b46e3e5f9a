//! The domain event and its publication history.

use crate::error::{StoreError, StoreResult};
use crate::topic::{EventPayload, Topic};
use crate::types::{EventId, SubscriptionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A subscriber that failed during one publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberFailure {
    pub subscription_id: SubscriptionId,
    pub error_message: String,
}

impl SubscriberFailure {
    pub fn new(subscription_id: impl Into<SubscriptionId>, error_message: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            error_message: error_message.into(),
        }
    }
}

/// One delivery attempt over the subscribers of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub published_at: DateTime<Utc>,
    pub failures: Vec<SubscriberFailure>,
}

impl Publication {
    pub fn succeeded(published_at: DateTime<Utc>) -> Self {
        Self {
            published_at,
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Delivery state of an event, derived from its history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// No publication yet.
    Pending,
    /// The latest publication has at least one failure.
    PartiallyFailed,
    /// The latest publication has no failures. Terminal.
    Delivered,
    /// Excluded from automatic delivery. Terminal.
    Quarantined,
}

impl EventStatus {
    pub const ALL: [EventStatus; 4] = [
        EventStatus::Pending,
        EventStatus::PartiallyFailed,
        EventStatus::Delivered,
        EventStatus::Quarantined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PartiallyFailed => "partially_failed",
            Self::Delivered => "delivered",
            Self::Quarantined => "quarantined",
        }
    }
}

/// Something that happened, plus every attempt made to tell subscribers.
///
/// Values are immutable: transitions return a new event. `id`, `occurred_at`
/// and the payload never change once the event is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    id: EventId,
    occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    payload: EventPayload,
    publications: Vec<Publication>,
    was_quarantined: bool,
}

impl DomainEvent {
    /// Rebuilds an event from persisted parts.
    pub fn from_parts(
        id: EventId,
        occurred_at: DateTime<Utc>,
        payload: EventPayload,
        publications: Vec<Publication>,
        was_quarantined: bool,
    ) -> Self {
        Self {
            id,
            occurred_at,
            payload,
            publications,
            was_quarantined,
        }
    }

    pub fn id(&self) -> &EventId {
        &self.id
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn topic(&self) -> Topic {
        self.payload.topic()
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn publications(&self) -> &[Publication] {
        &self.publications
    }

    pub fn was_quarantined(&self) -> bool {
        self.was_quarantined
    }

    pub fn latest_publication(&self) -> Option<&Publication> {
        self.publications.last()
    }

    pub fn is_delivered(&self) -> bool {
        self.latest_publication().is_some_and(Publication::is_success)
    }

    pub fn status(&self) -> EventStatus {
        if self.is_delivered() {
            EventStatus::Delivered
        } else if self.was_quarantined {
            EventStatus::Quarantined
        } else if self.publications.is_empty() {
            EventStatus::Pending
        } else {
            EventStatus::PartiallyFailed
        }
    }

    /// Subscriptions the next attempt should call.
    ///
    /// `None` means every subscriber of the topic (nothing attempted yet).
    /// Otherwise only those that failed in the latest publication, so
    /// side effects that already happened are not repeated.
    pub fn subscriptions_to_retry(&self) -> Option<Vec<SubscriptionId>> {
        self.latest_publication().map(|publication| {
            publication
                .failures
                .iter()
                .map(|failure| failure.subscription_id.clone())
                .collect()
        })
    }

    /// Returns a copy with `publication` appended to the history.
    pub fn with_publication(&self, publication: Publication) -> Self {
        let mut next = self.clone();
        next.publications.push(publication);
        next
    }

    /// Returns a copy flagged as quarantined.
    pub fn quarantined(&self) -> StoreResult<Self> {
        if self.is_delivered() {
            return Err(StoreError::AlreadyDelivered(self.id.clone()));
        }
        let mut next = self.clone();
        next.was_quarantined = true;
        Ok(next)
    }
}
