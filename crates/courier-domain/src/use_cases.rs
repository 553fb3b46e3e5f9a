//! Use cases that change an aggregate and enqueue the matching event.

use crate::aggregates::{Convention, FormEstablishment};
use crate::error::StoreError;
use crate::event::DomainEvent;
use crate::factory::EventFactory;
use crate::ports::UnitOfWorkPerformer;
use crate::topic::{ConventionPayload, EventPayload, FormEstablishmentPayload};
use thiserror::Error;
use tracing::info;

/// Error returned by a use case.
#[derive(Error, Debug)]
pub enum UseCaseError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The request conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),
}

pub type UseCaseResult<T> = Result<T, UseCaseError>;

/// Saves a submitted convention and announces it.
#[derive(Debug, Clone)]
pub struct SubmitConvention {
    factory: EventFactory,
}

impl SubmitConvention {
    pub fn new(factory: EventFactory) -> Self {
        Self { factory }
    }

    pub fn execute<P: UnitOfWorkPerformer>(
        &self,
        performer: &P,
        convention: Convention,
    ) -> UseCaseResult<DomainEvent> {
        let event = performer.perform(|uow| {
            uow.conventions.save(&convention)?;
            let event = self.factory.create_event(EventPayload::ConventionSubmittedByBeneficiary(
                ConventionPayload {
                    convention_id: convention.id.clone(),
                    siret: convention.siret.clone(),
                    agency_id: convention.agency_id.clone(),
                    beneficiary_email: convention.beneficiary_email.clone(),
                },
            ));
            uow.outbox.save(&event)?;
            Ok::<_, UseCaseError>(event)
        })?;

        info!(
            convention_id = %convention.id,
            event_id = %event.id(),
            "Convention submitted"
        );
        Ok(event)
    }
}

/// Registers an establishment from the form and announces it.
#[derive(Debug, Clone)]
pub struct AddFormEstablishment {
    factory: EventFactory,
}

impl AddFormEstablishment {
    pub fn new(factory: EventFactory) -> Self {
        Self { factory }
    }

    pub fn execute<P: UnitOfWorkPerformer>(
        &self,
        performer: &P,
        establishment: FormEstablishment,
    ) -> UseCaseResult<DomainEvent> {
        let event = performer.perform(|uow| {
            if uow.establishments.get_by_siret(&establishment.siret)?.is_some() {
                return Err(UseCaseError::Conflict(format!(
                    "establishment {} already exists",
                    establishment.siret
                )));
            }
            uow.establishments.save(&establishment)?;
            let event = self.factory.create_event(EventPayload::FormEstablishmentAdded(
                FormEstablishmentPayload {
                    siret: establishment.siret.clone(),
                    business_name: establishment.business_name.clone(),
                    contact_email: establishment.contact_email.clone(),
                },
            ));
            uow.outbox.save(&event)?;
            Ok(event)
        })?;

        info!(
            siret = %establishment.siret,
            event_id = %event.id(),
            "Form establishment added"
        );
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregates::ConventionStatus;
    use crate::clock::CustomClock;
    use crate::in_memory::InMemoryDatabase;
    use crate::topic::Topic;
    use crate::types::ConventionId;
    use crate::uuid_generator::TestUuidGenerator;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn factory(quarantined: HashSet<Topic>) -> EventFactory {
        EventFactory::new(
            Arc::new(CustomClock::default()),
            Arc::new(TestUuidGenerator::new()),
            quarantined,
        )
    }

    fn convention(id: &str) -> Convention {
        Convention {
            id: ConventionId::from(id),
            status: ConventionStatus::ReadyToSign,
            siret: "12345678901234".to_string(),
            agency_id: "agency-1".to_string(),
            beneficiary_name: "Jane".to_string(),
            beneficiary_email: "jane@example.com".to_string(),
        }
    }

    fn establishment(siret: &str) -> FormEstablishment {
        FormEstablishment {
            siret: siret.to_string(),
            business_name: "Garage".to_string(),
            contact_email: "garage@example.com".to_string(),
        }
    }

    #[test]
    fn submit_convention_writes_convention_and_event() {
        let db = InMemoryDatabase::new();
        let event = SubmitConvention::new(factory(HashSet::new()))
            .execute(&db, convention("11111111-1111-1111-1111-111111111111"))
            .unwrap();

        assert_eq!(db.conventions().len(), 1);
        assert_eq!(db.events(), vec![event.clone()]);
        assert_eq!(event.topic(), Topic::ConventionSubmittedByBeneficiary);
    }

    #[test]
    fn invalid_convention_id_rolls_back_everything() {
        let db = InMemoryDatabase::new();
        let result = SubmitConvention::new(factory(HashSet::new()))
            .execute(&db, convention("not-a-uuid"));

        assert!(matches!(
            result,
            Err(UseCaseError::Store(StoreError::ConstraintViolation(_)))
        ));
        assert!(db.conventions().is_empty());
        assert!(db.events().is_empty());
    }

    #[test]
    fn second_establishment_with_same_siret_conflicts() {
        let db = InMemoryDatabase::new();
        let use_case = AddFormEstablishment::new(factory(HashSet::new()));
        use_case.execute(&db, establishment("12345678901234")).unwrap();
        let err = use_case
            .execute(&db, establishment("12345678901234"))
            .unwrap_err();

        assert!(matches!(err, UseCaseError::Conflict(_)));
        assert_eq!(db.establishments().len(), 1);
        assert_eq!(db.events().len(), 1);
    }

    #[test]
    fn quarantined_topic_is_enqueued_flagged() {
        let db = InMemoryDatabase::new();
        let quarantined = HashSet::from([Topic::FormEstablishmentAdded]);
        let event = AddFormEstablishment::new(factory(quarantined))
            .execute(&db, establishment("98765432109876"))
            .unwrap();
        assert!(event.was_quarantined());
        assert!(db.events()[0].was_quarantined());
    }
}
