use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubmissionCandidate {
    pub id: Uuid,
    pub program_id: Uuid,
    pub job_id: Uuid,
    pub candidate_id: Uuid,
    pub vendor_id: Uuid,
    pub candidate_name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
