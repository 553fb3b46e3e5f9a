//! Topics and their payloads.
//!
//! Each topic has exactly one payload shape. [`EventPayload`] is the closed
//! union of those shapes and derives its topic, so an event can never carry
//! a payload that does not belong to its topic.

use crate::types::ConventionId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of business fact an event announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topic {
    ConventionSubmittedByBeneficiary,
    ConventionPartiallySigned,
    ConventionFullySigned,
    ConventionAcceptedByValidator,
    ConventionRejected,
    ConventionCancelled,
    FormEstablishmentAdded,
    FormEstablishmentEdited,
    AgencyRegistered,
    MagicLinkRenewalRequested,
}

impl Topic {
    pub const ALL: [Topic; 10] = [
        Topic::ConventionSubmittedByBeneficiary,
        Topic::ConventionPartiallySigned,
        Topic::ConventionFullySigned,
        Topic::ConventionAcceptedByValidator,
        Topic::ConventionRejected,
        Topic::ConventionCancelled,
        Topic::FormEstablishmentAdded,
        Topic::FormEstablishmentEdited,
        Topic::AgencyRegistered,
        Topic::MagicLinkRenewalRequested,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConventionSubmittedByBeneficiary => "ConventionSubmittedByBeneficiary",
            Self::ConventionPartiallySigned => "ConventionPartiallySigned",
            Self::ConventionFullySigned => "ConventionFullySigned",
            Self::ConventionAcceptedByValidator => "ConventionAcceptedByValidator",
            Self::ConventionRejected => "ConventionRejected",
            Self::ConventionCancelled => "ConventionCancelled",
            Self::FormEstablishmentAdded => "FormEstablishmentAdded",
            Self::FormEstablishmentEdited => "FormEstablishmentEdited",
            Self::AgencyRegistered => "AgencyRegistered",
            Self::MagicLinkRenewalRequested => "MagicLinkRenewalRequested",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known topic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown topic: {0}")]
pub struct UnknownTopic(pub String);

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .iter()
            .copied()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| UnknownTopic(s.to_string()))
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// A convention moving through its signature workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConventionPayload {
    pub convention_id: ConventionId,
    pub siret: String,
    pub agency_id: String,
    pub beneficiary_email: String,
}

/// A convention stopped by a validator or a signatory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConventionStatusChangePayload {
    pub convention_id: ConventionId,
    pub justification: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormEstablishmentPayload {
    pub siret: String,
    pub business_name: String,
    pub contact_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencyPayload {
    pub agency_id: String,
    pub agency_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicLinkRenewalPayload {
    pub convention_id: ConventionId,
    pub email: String,
}

/// Payload of a domain event, one variant per [`Topic`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload")]
pub enum EventPayload {
    ConventionSubmittedByBeneficiary(ConventionPayload),
    ConventionPartiallySigned(ConventionPayload),
    ConventionFullySigned(ConventionPayload),
    ConventionAcceptedByValidator(ConventionPayload),
    ConventionRejected(ConventionStatusChangePayload),
    ConventionCancelled(ConventionStatusChangePayload),
    FormEstablishmentAdded(FormEstablishmentPayload),
    FormEstablishmentEdited(FormEstablishmentPayload),
    AgencyRegistered(AgencyPayload),
    MagicLinkRenewalRequested(MagicLinkRenewalPayload),
}

impl EventPayload {
    pub fn topic(&self) -> Topic {
        match self {
            Self::ConventionSubmittedByBeneficiary(_) => Topic::ConventionSubmittedByBeneficiary,
            Self::ConventionPartiallySigned(_) => Topic::ConventionPartiallySigned,
            Self::ConventionFullySigned(_) => Topic::ConventionFullySigned,
            Self::ConventionAcceptedByValidator(_) => Topic::ConventionAcceptedByValidator,
            Self::ConventionRejected(_) => Topic::ConventionRejected,
            Self::ConventionCancelled(_) => Topic::ConventionCancelled,
            Self::FormEstablishmentAdded(_) => Topic::FormEstablishmentAdded,
            Self::FormEstablishmentEdited(_) => Topic::FormEstablishmentEdited,
            Self::AgencyRegistered(_) => Topic::AgencyRegistered,
            Self::MagicLinkRenewalRequested(_) => Topic::MagicLinkRenewalRequested,
        }
    }

    /// Serializes the payload body alone; the topic is stored next to it.
    pub fn body_json(&self) -> serde_json::Result<String> {
        match self {
            Self::ConventionSubmittedByBeneficiary(p)
            | Self::ConventionPartiallySigned(p)
            | Self::ConventionFullySigned(p)
            | Self::ConventionAcceptedByValidator(p) => serde_json::to_string(p),
            Self::ConventionRejected(p) | Self::ConventionCancelled(p) => serde_json::to_string(p),
            Self::FormEstablishmentAdded(p) | Self::FormEstablishmentEdited(p) => {
                serde_json::to_string(p)
            }
            Self::AgencyRegistered(p) => serde_json::to_string(p),
            Self::MagicLinkRenewalRequested(p) => serde_json::to_string(p),
        }
    }

    /// Decodes a payload body stored under `topic`.
    ///
    /// Fails when the body does not have the shape `topic` requires.
    pub fn from_body_json(topic: Topic, body: &str) -> serde_json::Result<Self> {
        Ok(match topic {
            Topic::ConventionSubmittedByBeneficiary => {
                Self::ConventionSubmittedByBeneficiary(serde_json::from_str(body)?)
            }
            Topic::ConventionPartiallySigned => {
                Self::ConventionPartiallySigned(serde_json::from_str(body)?)
            }
            Topic::ConventionFullySigned => Self::ConventionFullySigned(serde_json::from_str(body)?),
            Topic::ConventionAcceptedByValidator => {
                Self::ConventionAcceptedByValidator(serde_json::from_str(body)?)
            }
            Topic::ConventionRejected => Self::ConventionRejected(serde_json::from_str(body)?),
            Topic::ConventionCancelled => Self::ConventionCancelled(serde_json::from_str(body)?),
            Topic::FormEstablishmentAdded => {
                Self::FormEstablishmentAdded(serde_json::from_str(body)?)
            }
            Topic::FormEstablishmentEdited => {
                Self::FormEstablishmentEdited(serde_json::from_str(body)?)
            }
            Topic::AgencyRegistered => Self::AgencyRegistered(serde_json::from_str(body)?),
            Topic::MagicLinkRenewalRequested => {
                Self::MagicLinkRenewalRequested(serde_json::from_str(body)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agency() -> EventPayload {
        EventPayload::AgencyRegistered(AgencyPayload {
            agency_id: "agency-1".to_string(),
            agency_name: "Pole emploi Lyon".to_string(),
        })
    }

    #[test]
    fn topic_string_conversion() {
        for topic in Topic::ALL {
            assert_eq!(topic.as_str().parse::<Topic>().unwrap(), topic);
        }
        assert_eq!(
            "ConventionSigned".parse::<Topic>(),
            Err(UnknownTopic("ConventionSigned".to_string()))
        );
    }

    #[test]
    fn topic_serde_matches_as_str() {
        let json = serde_json::to_string(&Topic::FormEstablishmentAdded).unwrap();
        assert_eq!(json, "\"FormEstablishmentAdded\"");
    }

    #[test]
    fn payload_derives_topic() {
        assert_eq!(agency().topic(), Topic::AgencyRegistered);
    }

    #[test]
    fn body_json_decodes_under_its_topic() {
        let payload = agency();
        let body = payload.body_json().unwrap();
        assert!(!body.contains("topic"));
        let decoded = EventPayload::from_body_json(Topic::AgencyRegistered, &body).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn body_json_rejects_foreign_topic() {
        let body = agency().body_json().unwrap();
        assert!(EventPayload::from_body_json(Topic::FormEstablishmentAdded, &body).is_err());
    }

    #[test]
    fn tagged_form_carries_topic() {
        let value = serde_json::to_value(agency()).unwrap();
        assert_eq!(value["topic"], "AgencyRegistered");
        assert_eq!(value["payload"]["agency_id"], "agency-1");
    }
}
