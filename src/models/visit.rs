use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::models::document::IngestRecord;

/// Reason the patient is being seen.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, EnumString, Display, AsRefStr, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VisitType {
    #[default]
    Initial,
    FollowUp,
    Emergency,
    RoutineCheckup,
}

/// Lifecycle state of a visit.
///
/// ```text
/// requested ──► in_progress ──► completed
///     │              │
///     └──► cancelled ◄┘
/// ```
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, EnumString, Display, AsRefStr, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VisitStatus {
    #[default]
    Requested,
    InProgress,
    Completed,
    Cancelled,
}

impl VisitStatus {
    /// Whether `self -> next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: VisitStatus) -> bool {
        use VisitStatus::*;
        matches!(
            (self, next),
            (Requested, InProgress) | (Requested, Cancelled) | (InProgress, Completed) | (InProgress, Cancelled)
        )
    }
}

/// A visit aggregate with its uploaded documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pseudonym_id: String,
    pub visit_timestamp: DateTime<Utc>,
    pub visit_type: VisitType,
    pub chief_complaint: String,
    pub ingests: Vec<IngestRecord>,
    pub status: VisitStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Text fields of a visit intake submission, checked before anything is uploaded.
#[derive(Debug, Validate)]
pub struct VisitForm {
    #[garde(length(min = 1, max = 2000))]
    pub chief_complaint: String,

    #[garde(skip)]
    pub visit_type: VisitType,
}

/// Body of `PATCH /api/visits/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct UpdateVisitStatusRequest {
    pub status: String,
}

/// Response wrapping a single visit.
#[derive(Debug, Serialize)]
pub struct VisitResponse {
    pub message: String,
    pub visit: Visit,
}
