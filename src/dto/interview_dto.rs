use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

use crate::models::attendee::{Attendee, AttendeeCategory, NewAttendee};
use crate::models::interview::{Feedback, Interview};
use crate::models::slot::{NewSlot, Slot};

fn default_time_zone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SlotPayload {
    pub interview_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl From<&SlotPayload> for NewSlot {
    fn from(p: &SlotPayload) -> Self {
        NewSlot {
            interview_date: p.interview_date,
            start_time: p.start_time,
            end_time: p.end_time,
        }
    }
}

pub fn to_new_slots(slots: &[SlotPayload]) -> Vec<NewSlot> {
    slots.iter().map(NewSlot::from).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AttendeePayload {
    pub participant_id: Option<Uuid>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
}

impl AttendeePayload {
    pub fn into_new(self, category: AttendeeCategory) -> NewAttendee {
        NewAttendee {
            participant_id: self.participant_id,
            external_email: self.email,
            name: self.name,
            phone: self.phone,
            category,
        }
    }
}

pub fn categorized(category: AttendeeCategory, rows: Vec<AttendeePayload>) -> Vec<NewAttendee> {
    rows.into_iter().map(|a| a.into_new(category)).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateInterviewPayload {
    pub job_id: Uuid,
    pub candidate_id: Uuid,
    /// Defaults to the job's program.
    pub program_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(max = 255))]
    pub location: Option<String>,
    #[serde(default = "default_time_zone")]
    #[validate(length(min = 1, max = 64))]
    pub time_zone: String,
    pub notes: Option<String>,
    #[validate(length(min = 1), nested)]
    pub slots: Vec<SlotPayload>,
    #[serde(default)]
    #[validate(nested)]
    pub interviewers: Vec<AttendeePayload>,
    #[serde(default)]
    #[validate(nested)]
    pub external_attendees: Vec<AttendeePayload>,
    #[serde(default)]
    #[validate(nested)]
    pub additional_attendees: Vec<AttendeePayload>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, JsonValue>,
    #[serde(default)]
    pub calendar_sync: bool,
    #[serde(default)]
    pub save_as_draft: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AcceptInterviewPayload {
    #[validate(length(min = 1))]
    pub slot_ids: Vec<Uuid>,
    /// Identifies the accepting attendee when the caller is not a listed
    /// participant.
    #[validate(email)]
    pub attendee_email: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProposeSlotsPayload {
    #[validate(length(min = 1), nested)]
    pub slots: Vec<SlotPayload>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Attendee lists left out keep their current rows; a present list replaces
/// its whole category.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReschedulePayload {
    #[validate(length(min = 1), nested)]
    pub slots: Vec<SlotPayload>,
    pub interviewers: Option<Vec<AttendeePayload>>,
    pub external_attendees: Option<Vec<AttendeePayload>>,
    pub additional_attendees: Option<Vec<AttendeePayload>>,
    pub custom_fields: Option<BTreeMap<String, JsonValue>>,
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(max = 255))]
    pub location: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub time_zone: Option<String>,
    pub notes: Option<String>,
    pub calendar_sync: Option<bool>,
}

impl ReschedulePayload {
    pub fn attendee_replacements(&self) -> Vec<(AttendeeCategory, Vec<NewAttendee>)> {
        [
            (AttendeeCategory::Interviewer, &self.interviewers),
            (AttendeeCategory::External, &self.external_attendees),
            (AttendeeCategory::Additional, &self.additional_attendees),
        ]
        .into_iter()
        .filter_map(|(category, rows)| {
            rows.as_ref()
                .map(|rows| (category, categorized(category, rows.clone())))
        })
        .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CompleteInterviewPayload {
    #[validate(length(min = 1, max = 50))]
    pub outcome: String,
    pub rating: Option<Decimal>,
    #[validate(length(max = 5000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonPayload {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineageQuery {
    pub job_id: Uuid,
    pub candidate_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterviewDetail {
    #[serde(flatten)]
    pub interview: Interview,
    pub slots: Vec<Slot>,
    pub attendees: Vec<Attendee>,
    pub custom_fields: BTreeMap<String, JsonValue>,
    pub feedback: Option<Feedback>,
    pub reschedule_allowed: bool,
    pub calendar_synced: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptInterviewResponse {
    pub already_accepted: bool,
    #[serde(flatten)]
    pub detail: InterviewDetail,
}
