//! In-memory backend with the same contract as the SQLite one.
//!
//! `perform` runs the use case against a copy of the committed state and
//! swaps the copy in only when the use case returns `Ok`.

use crate::aggregates::{is_uuid_like, is_valid_siret, Convention, FormEstablishment};
use crate::error::{StoreError, StoreResult};
use crate::event::DomainEvent;
use crate::ports::{
    ConventionRepository, EstablishmentRepository, OutboxRepository, OutboxStore, StatusCounts,
    UnitOfWork, UnitOfWorkPerformer,
};
use crate::save_plan::{merged_event, plan_save, SavePlan};
use crate::types::{ConventionId, EventId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    events: BTreeMap<EventId, DomainEvent>,
    conventions: BTreeMap<ConventionId, Convention>,
    establishments: BTreeMap<String, FormEstablishment>,
}

/// Committed state shared by every caller.
///
/// Writers hold `writer` for a whole `perform` or `save`, so use cases are
/// serialized the way a single SQLite writer would serialize them. `state`
/// is only locked to snapshot or swap, so reads inside a use case see the
/// last committed state. Writing to the same database from inside a use
/// case deadlocks.
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    writer: Mutex<()>,
    state: Mutex<MemoryState>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed events, ordered by id.
    pub fn events(&self) -> Vec<DomainEvent> {
        self.state.lock().events.values().cloned().collect()
    }

    pub fn conventions(&self) -> Vec<Convention> {
        self.state.lock().conventions.values().cloned().collect()
    }

    pub fn establishments(&self) -> Vec<FormEstablishment> {
        self.state.lock().establishments.values().cloned().collect()
    }
}

impl UnitOfWorkPerformer for InMemoryDatabase {
    fn perform<T, E, F>(&self, use_case: F) -> Result<T, E>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let _writer = self.writer.lock();
        let mut working = self.state.lock().clone();

        let result = {
            let MemoryState {
                events,
                conventions,
                establishments,
            } = &mut working;
            let mut uow = UnitOfWork {
                outbox: Box::new(MemoryOutbox { events }),
                conventions: Box::new(MemoryConventions { conventions }),
                establishments: Box::new(MemoryEstablishments { establishments }),
            };
            use_case(&mut uow)
        };

        match result {
            Ok(value) => {
                *self.state.lock() = working;
                Ok(value)
            }
            Err(err) => {
                debug!("Use case failed, discarding in-memory changes");
                Err(err)
            }
        }
    }
}

#[async_trait]
impl OutboxStore for InMemoryDatabase {
    async fn save(&self, event: &DomainEvent) -> StoreResult<()> {
        let _writer = self.writer.lock();
        let mut state = self.state.lock();
        MemoryOutbox {
            events: &mut state.events,
        }
        .save(event)
    }

    async fn get_by_id(&self, id: &EventId) -> StoreResult<Option<DomainEvent>> {
        Ok(self.state.lock().events.get(id).cloned())
    }

    async fn fetch_undelivered(&self, limit: usize) -> StoreResult<Vec<DomainEvent>> {
        let state = self.state.lock();
        let mut events: Vec<DomainEvent> = state
            .events
            .values()
            .filter(|event| !event.is_delivered() && !event.was_quarantined())
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            a.occurred_at()
                .cmp(&b.occurred_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        events.truncate(limit);
        Ok(events)
    }

    async fn count_by_status(&self) -> StoreResult<StatusCounts> {
        let state = self.state.lock();
        let mut counts = StatusCounts::default();
        for event in state.events.values() {
            counts.increment(event.status());
        }
        Ok(counts)
    }
}

// ============================================================================
// Repositories over the working copy
// ============================================================================

struct MemoryOutbox<'a> {
    events: &'a mut BTreeMap<EventId, DomainEvent>,
}

impl OutboxRepository for MemoryOutbox<'_> {
    fn save(&mut self, event: &DomainEvent) -> StoreResult<()> {
        if !is_uuid_like(event.id().as_str()) {
            return Err(StoreError::ConstraintViolation(format!(
                "outbox_events.id is not a uuid: {}",
                event.id()
            )));
        }
        let stored = self.events.get(event.id());
        let plan = plan_save(stored, event)?;
        if plan == SavePlan::Unchanged {
            return Ok(());
        }
        let merged = merged_event(stored, event);
        self.events.insert(event.id().clone(), merged);
        Ok(())
    }

    fn get_by_id(&mut self, id: &EventId) -> StoreResult<Option<DomainEvent>> {
        Ok(self.events.get(id).cloned())
    }
}

struct MemoryConventions<'a> {
    conventions: &'a mut BTreeMap<ConventionId, Convention>,
}

impl ConventionRepository for MemoryConventions<'_> {
    fn save(&mut self, convention: &Convention) -> StoreResult<()> {
        if !is_uuid_like(convention.id.as_str()) {
            return Err(StoreError::ConstraintViolation(format!(
                "conventions.id is not a uuid: {}",
                convention.id
            )));
        }
        if self.conventions.contains_key(&convention.id) {
            return Err(StoreError::ConstraintViolation(format!(
                "conventions.id already exists: {}",
                convention.id
            )));
        }
        self.conventions
            .insert(convention.id.clone(), convention.clone());
        Ok(())
    }

    fn get_by_id(&mut self, id: &ConventionId) -> StoreResult<Option<Convention>> {
        Ok(self.conventions.get(id).cloned())
    }
}

struct MemoryEstablishments<'a> {
    establishments: &'a mut BTreeMap<String, FormEstablishment>,
}

impl EstablishmentRepository for MemoryEstablishments<'_> {
    fn save(&mut self, establishment: &FormEstablishment) -> StoreResult<()> {
        if !is_valid_siret(&establishment.siret) {
            return Err(StoreError::ConstraintViolation(format!(
                "form_establishments.siret is not 14 digits: {}",
                establishment.siret
            )));
        }
        self.establishments
            .insert(establishment.siret.clone(), establishment.clone());
        Ok(())
    }

    fn get_by_siret(&mut self, siret: &str) -> StoreResult<Option<FormEstablishment>> {
        Ok(self.establishments.get(siret).cloned())
    }
}
