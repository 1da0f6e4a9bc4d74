//! Call models
//!
//! A call record tracks one call across its four legs: the identities it
//! arrived with, the identities we substituted, the DID masking the
//! destination, and the peers chosen for each hop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Call status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallStatus {
    /// Dispatched toward the intermediate carrier
    #[default]
    Active,
    /// Came back from the intermediate carrier, heading to the final one
    ReturnedFromS3,
    /// Terminated normally
    Completed,
    /// Aborted by a verification failure
    Failed,
    /// Reclaimed by the stale-call sweep
    Abandoned,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Active => write!(f, "ACTIVE"),
            CallStatus::ReturnedFromS3 => write!(f, "RETURNED_FROM_S3"),
            CallStatus::Completed => write!(f, "COMPLETED"),
            CallStatus::Failed => write!(f, "FAILED"),
            CallStatus::Abandoned => write!(f, "ABANDONED"),
        }
    }
}

impl CallStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Some(CallStatus::Active),
            "RETURNED_FROM_S3" => Some(CallStatus::ReturnedFromS3),
            "COMPLETED" => Some(CallStatus::Completed),
            "FAILED" => Some(CallStatus::Failed),
            "ABANDONED" => Some(CallStatus::Abandoned),
            _ => None,
        }
    }

    /// Whether the call still holds resources (DID, channel slots)
    pub fn is_live(&self) -> bool {
        matches!(self, CallStatus::Active | CallStatus::ReturnedFromS3)
    }
}

/// Which hop of the topology the call last traversed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallStep {
    #[default]
    S1ToS2,
    S2ToS3,
    S3ToS2,
    S2ToS4,
    S4ToS2,
    Completed,
    Cleanup,
}

impl fmt::Display for CallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStep::S1ToS2 => write!(f, "S1_TO_S2"),
            CallStep::S2ToS3 => write!(f, "S2_TO_S3"),
            CallStep::S3ToS2 => write!(f, "S3_TO_S2"),
            CallStep::S2ToS4 => write!(f, "S2_TO_S4"),
            CallStep::S4ToS2 => write!(f, "S4_TO_S2"),
            CallStep::Completed => write!(f, "COMPLETED"),
            CallStep::Cleanup => write!(f, "CLEANUP"),
        }
    }
}

impl CallStep {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "S1_TO_S2" => Some(CallStep::S1ToS2),
            "S2_TO_S3" => Some(CallStep::S2ToS3),
            "S3_TO_S2" => Some(CallStep::S3ToS2),
            "S2_TO_S4" => Some(CallStep::S2ToS4),
            "S4_TO_S2" => Some(CallStep::S4ToS2),
            "COMPLETED" => Some(CallStep::Completed),
            "CLEANUP" => Some(CallStep::Cleanup),
            _ => None,
        }
    }
}

/// One call's state across the four legs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    /// Call unique identifier (supplied by the call-control front-end)
    pub call_id: String,

    /// ANI as delivered by the inbound carrier
    pub original_ani: String,

    /// DNIS as delivered by the inbound carrier
    pub original_dnis: String,

    /// ANI presented to the intermediate carrier (= original DNIS)
    pub transformed_ani: String,

    /// Pool number masking the destination while the call is at the
    /// intermediate carrier
    pub assigned_did: String,

    /// Inbound peer name
    pub inbound_peer: String,

    /// Selected intermediate peer name
    pub intermediate_peer: String,

    /// Selected final peer name
    pub final_peer: String,

    /// Current status
    pub status: CallStatus,

    /// Current step
    pub current_step: CallStep,

    /// When leg 1 was processed
    pub start_time: DateTime<Utc>,

    /// When the call reached a terminal state
    pub end_time: Option<DateTime<Utc>>,

    /// Total duration in seconds
    pub duration_secs: i64,
}

impl CallRecord {
    /// Whether the record still holds resources
    #[inline]
    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }
}

/// What the engine tells the call-control front-end to do next
#[derive(Debug, Clone, Serialize)]
pub struct CallResponse {
    /// Assigned DID (leg 1 only)
    pub did_assigned: Option<String>,

    /// Endpoint the dialplan should dial next
    pub next_hop: String,

    /// Caller number to present on the outgoing leg
    pub ani_to_send: String,

    /// Called number to present on the outgoing leg
    pub dnis_to_send: String,
}

/// Identity check performed on a leg, kept for audit
///
/// Appended on every leg, pass or fail; never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    /// Record id
    pub id: Uuid,

    /// Call this check belongs to
    pub call_id: String,

    /// Which hop was being verified
    pub step: CallStep,

    /// ANI we expected to see
    pub expected_ani: String,

    /// DNIS we expected to see
    pub expected_dnis: String,

    /// ANI actually received
    pub received_ani: String,

    /// DNIS actually received
    pub received_dnis: String,

    /// Source address of the leg, when known
    pub source_ip: Option<String>,

    /// Whether the leg passed verification
    pub verified: bool,

    /// When the check ran
    pub created_at: DateTime<Utc>,
}

impl Verification {
    /// Build a verification record for a leg
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        call_id: impl Into<String>,
        step: CallStep,
        expected_ani: impl Into<String>,
        expected_dnis: impl Into<String>,
        received_ani: impl Into<String>,
        received_dnis: impl Into<String>,
        source_ip: Option<String>,
        verified: bool,
    ) -> Self {
        Verification {
            id: Uuid::new_v4(),
            call_id: call_id.into(),
            step,
            expected_ani: expected_ani.into(),
            expected_dnis: expected_dnis.into(),
            received_ani: received_ani.into(),
            received_dnis: received_dnis.into(),
            source_ip,
            verified,
            created_at: Utc::now(),
        }
    }
}
