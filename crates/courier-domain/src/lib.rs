//! # Courier domain
//!
//! Domain events, the outbox merge rules and the unit-of-work boundary.
//!
//! ## Principles
//!
//! - **A state change and its event commit together** - both are written through one [`UnitOfWork`]
//! - **History is append-only** - a saved event only gains publications, never loses or edits them
//! - **Quarantine is decided at creation** - from an injected topic set, and never switched off
//! - **Delivery never blocks the write path** - the crawler works from the outbox afterwards
//!
//! ## Flow
//!
//! ```text
//! WRITE:
//!   use case → performer.perform(|uow| aggregate + outbox.save) → commit | rollback
//!
//! DELIVER:
//!   OutboxStore::fetch_undelivered → subscribers → with_publication → OutboxStore::save
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::collections::HashSet;
//! use std::sync::Arc;
//! use courier_domain::{
//!     AgencyPayload, EventFactory, EventPayload, InMemoryDatabase, StoreError,
//!     SystemClock, RandomUuidGenerator, UnitOfWorkPerformer,
//! };
//!
//! let factory = EventFactory::new(
//!     Arc::new(SystemClock),
//!     Arc::new(RandomUuidGenerator),
//!     HashSet::new(),
//! );
//! let db = InMemoryDatabase::new();
//!
//! let event = db
//!     .perform(|uow| {
//!         let event = factory.create_event(EventPayload::AgencyRegistered(AgencyPayload {
//!             agency_id: "agency-1".to_string(),
//!             agency_name: "Agency".to_string(),
//!         }));
//!         uow.outbox.save(&event)?;
//!         Ok::<_, StoreError>(event)
//!     })
//!     .unwrap();
//!
//! assert_eq!(db.events(), vec![event]);
//! ```
//!
//! ## Crate Structure
//!
//! - [`event`] - DomainEvent, Publication, EventStatus
//! - [`topic`] - Topics and payload shapes
//! - [`factory`] - Event construction and quarantine policy
//! - [`save_plan`] - Merge rules shared by every backend
//! - [`ports`] - Repository ports, UnitOfWork, performer, crawler store
//! - [`in_memory`] - In-memory backend
//! - [`use_cases`] - Sample use cases

pub mod aggregates;
pub mod clock;
mod error;
pub mod event;
pub mod factory;
pub mod in_memory;
pub mod ports;
pub mod save_plan;
pub mod topic;
mod types;
pub mod use_cases;
pub mod uuid_generator;

pub use aggregates::{is_uuid_like, is_valid_siret, Convention, ConventionStatus, FormEstablishment};
pub use clock::{Clock, CustomClock, SystemClock};
pub use error::{StoreError, StoreResult};
pub use event::{DomainEvent, EventStatus, Publication, SubscriberFailure};
pub use factory::{CreateEventOptions, EventFactory};
pub use in_memory::InMemoryDatabase;
pub use ports::{
    ConventionRepository, EstablishmentRepository, OutboxRepository, OutboxStore, StatusCounts,
    UnitOfWork, UnitOfWorkPerformer,
};
pub use save_plan::{merged_event, plan_save, SavePlan};
pub use topic::{
    AgencyPayload, ConventionPayload, ConventionStatusChangePayload, EventPayload,
    FormEstablishmentPayload, MagicLinkRenewalPayload, Topic, UnknownTopic,
};
pub use types::{ConventionId, EventId, SubscriptionId};
pub use use_cases::{AddFormEstablishment, SubmitConvention, UseCaseError, UseCaseResult};
pub use uuid_generator::{RandomUuidGenerator, TestUuidGenerator, UuidGenerator};
