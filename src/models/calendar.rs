use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct CalendarLink {
    pub interview_id: Uuid,
    pub external_event_id: String,
    pub encrypted_refresh_token: String,
    pub owning_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CalendarCredential {
    pub user_id: Uuid,
    pub encrypted_refresh_token: String,
    pub external_user_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub subscription_id: String,
    pub owning_user_id: Uuid,
    pub resource: String,
    pub expiration: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxAction {
    Create,
    Patch,
    Delete,
}

impl OutboxAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Patch => "patch",
            Self::Delete => "delete",
        }
    }
}

impl std::str::FromStr for OutboxAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "patch" => Ok(Self::Patch),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown calendar outbox action '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CalendarOutboxEntry {
    pub id: Uuid,
    pub interview_id: Uuid,
    pub action: String,
    pub owning_user_id: Uuid,
    pub external_event_id: Option<String>,
    pub encrypted_refresh_token: Option<String>,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}
