use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Job statuses in which no interview may be created or changed.
pub const HOLD_STATUSES: [&str; 7] = [
    "HOLD",
    "PENDING_REVIEW",
    "DRAFT",
    "FILLED",
    "CLOSED",
    "PENDING_APPROVAL",
    "REJECTED",
];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub program_id: Uuid,
    pub title: String,
    pub status: String,
}

impl Job {
    pub fn is_on_hold(&self) -> bool {
        HOLD_STATUSES
            .iter()
            .any(|s| s.eq_ignore_ascii_case(self.status.trim()))
    }
}
