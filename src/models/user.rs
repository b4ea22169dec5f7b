use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub vendor_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    SuperUser,
    Msp,
    Client,
    Vendor,
    Interviewer,
}

impl ActorRole {
    pub fn is_vendor_side(&self) -> bool {
        matches!(self, Self::Vendor)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperUser => "super_user",
            Self::Msp => "msp",
            Self::Client => "client",
            Self::Vendor => "vendor",
            Self::Interviewer => "interviewer",
        }
    }
}

impl std::str::FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "super_user" | "superuser" => Ok(Self::SuperUser),
            "msp" => Ok(Self::Msp),
            "client" => Ok(Self::Client),
            "vendor" => Ok(Self::Vendor),
            "interviewer" => Ok(Self::Interviewer),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// The authenticated caller, inserted into request extensions by the auth
/// middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: ActorRole,
}
