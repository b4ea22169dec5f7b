use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "interview_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterviewStatus {
    Draft,
    PendingAcceptance,
    PendingConfirmation,
    Accepted,
    Completed,
    Rejected,
    Cancelled,
}

impl InterviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::PendingAcceptance => "PENDING_ACCEPTANCE",
            Self::PendingConfirmation => "PENDING_CONFIRMATION",
            Self::Accepted => "ACCEPTED",
            Self::Completed => "COMPLETED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// A lineage may open a new revision only on top of one of these.
    pub fn allows_next_revision(&self) -> bool {
        matches!(self, Self::Accepted | Self::Completed)
    }
}

impl std::fmt::Display for InterviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Interview {
    pub id: Uuid,
    pub program_id: Uuid,
    pub job_id: Uuid,
    pub candidate_id: Uuid,
    pub vendor_id: Uuid,
    pub submission_id: Uuid,
    pub status: InterviewStatus,
    pub revision: i32,
    pub title: String,
    pub location: Option<String>,
    pub time_zone: String,
    pub cancel_reason: Option<String>,
    pub notes: Option<String>,
    pub calendar_sync: bool,
    pub is_deleted: bool,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Status of a sibling revision in the same `(job_id, candidate_id)` lineage.
#[derive(Debug, Clone, Copy, Serialize, FromRow)]
pub struct SiblingRevision {
    pub id: Uuid,
    pub revision: i32,
    pub status: InterviewStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomField {
    pub id: Uuid,
    pub interview_id: Uuid,
    pub field_key: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Feedback {
    pub id: Uuid,
    pub interview_id: Uuid,
    pub outcome: String,
    pub rating: Option<rust_decimal::Decimal>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}
