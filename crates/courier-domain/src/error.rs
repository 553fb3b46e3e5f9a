//! Store error types.

use crate::types::EventId;
use thiserror::Error;

/// Error raised by repository ports and the outbox merge.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The incoming publications do not start with the stored history.
    #[error("publication history of event {event_id} would be rewritten (stored {stored} publications, incoming {incoming})")]
    HistoryRewritten {
        event_id: EventId,
        stored: usize,
        incoming: usize,
    },

    /// A publication is older than the one before it.
    #[error("publication {position} of event {event_id} is older than its predecessor")]
    PublicationOutOfOrder { event_id: EventId, position: usize },

    /// id, topic, payload and occurred_at never change after insert.
    #[error("immutable field `{field}` of event {event_id} changed")]
    ImmutableFieldChanged {
        event_id: EventId,
        field: &'static str,
    },

    /// Delivered events cannot be quarantined.
    #[error("event {0} is already delivered")]
    AlreadyDelivered(EventId),

    /// Storage rejected the write (malformed identifier, duplicate key, ...).
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// A persisted row could not be decoded.
    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    /// Any other backend failure.
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }

    /// Whether the caller broke the save contract, as opposed to a storage failure.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::HistoryRewritten { .. }
                | Self::PublicationOutOfOrder { .. }
                | Self::ImmutableFieldChanged { .. }
                | Self::AlreadyDelivered(_)
        )
    }
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
