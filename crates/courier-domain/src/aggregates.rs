//! Aggregates written by the sample use cases.

use crate::types::ConventionId;
use serde::{Deserialize, Serialize};

/// Convention status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConventionStatus {
    ReadyToSign,
    PartiallySigned,
    AcceptedBySignatories,
    AcceptedByValidator,
    Rejected,
    Cancelled,
}

impl Default for ConventionStatus {
    fn default() -> Self {
        Self::ReadyToSign
    }
}

impl ConventionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadyToSign => "READY_TO_SIGN",
            Self::PartiallySigned => "PARTIALLY_SIGNED",
            Self::AcceptedBySignatories => "ACCEPTED_BY_SIGNATORIES",
            Self::AcceptedByValidator => "ACCEPTED_BY_VALIDATOR",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "READY_TO_SIGN" => Some(Self::ReadyToSign),
            "PARTIALLY_SIGNED" => Some(Self::PartiallySigned),
            "ACCEPTED_BY_SIGNATORIES" => Some(Self::AcceptedBySignatories),
            "ACCEPTED_BY_VALIDATOR" => Some(Self::AcceptedByValidator),
            "REJECTED" => Some(Self::Rejected),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// An internship agreement between a beneficiary, an establishment and an agency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Convention {
    pub id: ConventionId,
    pub status: ConventionStatus,
    pub siret: String,
    pub agency_id: String,
    pub beneficiary_name: String,
    pub beneficiary_email: String,
}

/// An establishment offering immersions, as submitted through the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormEstablishment {
    pub siret: String,
    pub business_name: String,
    pub contact_email: String,
}

/// 8-4-4-4-12 hexadecimal groups.
pub fn is_uuid_like(s: &str) -> bool {
    uuid::Uuid::try_parse(s).is_ok() && s.len() == 36
}

/// Exactly 14 ASCII digits.
pub fn is_valid_siret(s: &str) -> bool {
    s.len() == 14 && s.bytes().all(|b| b.is_ascii_digit())
}
