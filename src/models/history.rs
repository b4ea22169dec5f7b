use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub interview_id: Uuid,
    pub action: String,
    pub old_state: Option<String>,
    pub new_state: Option<String>,
    pub actor_id: Option<Uuid>,
    pub payload: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}
