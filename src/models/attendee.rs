use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attendee_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AttendeeStatus {
    Pending,
    Accepted,
    Declined,
}

/// Attendee rows are replaced per category on reschedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attendee_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AttendeeCategory {
    Interviewer,
    External,
    Additional,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attendee {
    pub id: Uuid,
    pub interview_id: Uuid,
    pub participant_id: Option<Uuid>,
    pub external_email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub category: AttendeeCategory,
    pub is_interviewer: bool,
    pub is_external: bool,
    pub status: AttendeeStatus,
    pub accepted_schedule_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Attendee {
    pub fn email(&self) -> Option<&str> {
        self.external_email.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAttendee {
    pub participant_id: Option<Uuid>,
    pub external_email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub category: AttendeeCategory,
}

impl NewAttendee {
    pub fn is_interviewer(&self) -> bool {
        self.category == AttendeeCategory::Interviewer
    }

    pub fn is_external(&self) -> bool {
        self.category == AttendeeCategory::External
    }
}
