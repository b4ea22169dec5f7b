use serde_json::Value as JsonValue;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::Result;
use crate::models::history::HistoryEntry;
use crate::models::interview::InterviewStatus;

pub const INTERVIEW_SCHEDULED: &str = "Interview Scheduled";
pub const NEXT_ROUND_SCHEDULED: &str = "Next Round Scheduled";
pub const INTERVIEW_PUBLISHED: &str = "Interview Published";
pub const INTERVIEW_ACCEPTED: &str = "Interview Accepted";
pub const SLOTS_PROPOSED: &str = "New Slots Proposed";
pub const INTERVIEW_RESCHEDULED: &str = "Interview Rescheduled";
pub const INTERVIEW_COMPLETED: &str = "Interview Completed";
pub const INTERVIEW_CANCELLED: &str = "Interview Cancelled";
pub const INTERVIEW_REJECTED: &str = "Interview Rejected";
pub const INTERVIEW_DELETED: &str = "Interview Deleted";
pub const CALENDAR_UPDATED: &str = "Calendar Event Updated";
pub const CALENDAR_DELETED: &str = "Calendar Event Deleted";

pub struct HistoryRecord<'a> {
    pub interview_id: Uuid,
    pub action: &'a str,
    pub old_state: Option<InterviewStatus>,
    pub new_state: Option<InterviewStatus>,
    pub actor_id: Option<Uuid>,
    pub payload: Option<JsonValue>,
}

pub async fn append(conn: &mut PgConnection, record: HistoryRecord<'_>) -> Result<HistoryEntry> {
    let row = sqlx::query_as::<_, HistoryEntry>(
        r#"
        INSERT INTO interview_history (interview_id, action, old_state, new_state, actor_id, payload, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, clock_timestamp())
        RETURNING id, interview_id, action, old_state, new_state, actor_id, payload, created_at
        "#,
    )
    .bind(record.interview_id)
    .bind(record.action)
    .bind(record.old_state.map(|s| s.as_str()))
    .bind(record.new_state.map(|s| s.as_str()))
    .bind(record.actor_id)
    .bind(record.payload)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

pub async fn list(pool: &PgPool, interview_id: Uuid) -> Result<Vec<HistoryEntry>> {
    let rows = sqlx::query_as::<_, HistoryEntry>(
        r#"
        SELECT id, interview_id, action, old_state, new_state, actor_id, payload, created_at
        FROM interview_history
        WHERE interview_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(interview_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
