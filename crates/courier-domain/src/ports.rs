//! Repository ports and the unit-of-work boundary.

use crate::aggregates::{Convention, FormEstablishment};
use crate::error::StoreResult;
use crate::event::{DomainEvent, EventStatus};
use crate::types::{ConventionId, EventId};
use async_trait::async_trait;
use serde::Serialize;

// ============================================================================
// Transaction-scoped repositories
// ============================================================================

/// Outbox access inside a unit of work.
pub trait OutboxRepository {
    /// Inserts or merges `event` following [`crate::save_plan::plan_save`].
    fn save(&mut self, event: &DomainEvent) -> StoreResult<()>;

    fn get_by_id(&mut self, id: &EventId) -> StoreResult<Option<DomainEvent>>;
}

pub trait ConventionRepository {
    /// Inserts a new convention. Fails with `ConstraintViolation` on a
    /// malformed or duplicate id.
    fn save(&mut self, convention: &Convention) -> StoreResult<()>;

    fn get_by_id(&mut self, id: &ConventionId) -> StoreResult<Option<Convention>>;
}

pub trait EstablishmentRepository {
    /// Inserts or replaces the establishment with the same SIRET.
    fn save(&mut self, establishment: &FormEstablishment) -> StoreResult<()>;

    fn get_by_siret(&mut self, siret: &str) -> StoreResult<Option<FormEstablishment>>;
}

/// Repositories bound to one transaction.
///
/// Built by a [`UnitOfWorkPerformer`] for a single `perform` call and
/// dropped when it returns; `'a` ties every port to that transaction.
pub struct UnitOfWork<'a> {
    pub outbox: Box<dyn OutboxRepository + 'a>,
    pub conventions: Box<dyn ConventionRepository + 'a>,
    pub establishments: Box<dyn EstablishmentRepository + 'a>,
}

/// Runs a use case inside one transaction.
///
/// `Ok` commits every write made through the unit of work. `Err` discards
/// all of them, outbox writes included, and is returned unchanged.
pub trait UnitOfWorkPerformer {
    fn perform<T, E, F>(&self, use_case: F) -> Result<T, E>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> Result<T, E>,
        E: From<crate::error::StoreError>;
}

// ============================================================================
// Crawler-facing store
// ============================================================================

/// Number of events per [`EventStatus`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub partially_failed: u64,
    pub delivered: u64,
    pub quarantined: u64,
}

impl StatusCounts {
    pub fn get(&self, status: EventStatus) -> u64 {
        match status {
            EventStatus::Pending => self.pending,
            EventStatus::PartiallyFailed => self.partially_failed,
            EventStatus::Delivered => self.delivered,
            EventStatus::Quarantined => self.quarantined,
        }
    }

    pub fn increment(&mut self, status: EventStatus) {
        match status {
            EventStatus::Pending => self.pending += 1,
            EventStatus::PartiallyFailed => self.partially_failed += 1,
            EventStatus::Delivered => self.delivered += 1,
            EventStatus::Quarantined => self.quarantined += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.pending + self.partially_failed + self.delivered + self.quarantined
    }
}

/// Outbox access outside any use case. Each call is its own transaction.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn save(&self, event: &DomainEvent) -> StoreResult<()>;

    async fn get_by_id(&self, id: &EventId) -> StoreResult<Option<DomainEvent>>;

    /// Events neither delivered nor quarantined, oldest `occurred_at` first.
    async fn fetch_undelivered(&self, limit: usize) -> StoreResult<Vec<DomainEvent>>;

    async fn count_by_status(&self) -> StoreResult<StatusCounts>;
}
