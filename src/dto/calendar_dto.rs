use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::services::calendar_service::Availability;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookQuery {
    #[serde(rename = "validationToken")]
    pub validation_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationBatch {
    #[serde(default)]
    pub value: Vec<ChangeNotification>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceData {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    pub change_type: String,
    #[serde(default)]
    pub resource: String,
    pub client_state: Option<String>,
    pub subscription_id: Option<String>,
    pub resource_data: Option<ResourceData>,
}

impl ChangeNotification {
    /// The event id from `resourceData`, or the last segment of `resource`
    /// (`Users/{id}/Events/{event-id}`).
    pub fn event_id(&self) -> Option<&str> {
        self.resource_data
            .as_ref()
            .and_then(|d| d.id.as_deref())
            .filter(|id| !id.is_empty())
            .or_else(|| {
                self.resource
                    .rsplit('/')
                    .next()
                    .map(|s| s.trim_end_matches("')").trim_start_matches("Events('"))
                    .filter(|id| !id.is_empty())
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectResponse {
    pub authorize_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallbackResponse {
    pub connected: bool,
    pub external_user_id: String,
    pub email: Option<String>,
    pub subscription_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AvailabilityRequest {
    #[serde(default)]
    pub participant_ids: Vec<Uuid>,
    #[serde(default)]
    pub emails: Vec<String>,
    pub interview_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[validate(length(min = 1, max = 64))]
    pub time_zone: Option<String>,
    /// Ignore slots of this interview, e.g. while rescheduling it.
    pub exclude_interview_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantAvailability {
    pub participant_id: Uuid,
    pub available: bool,
    pub conflicting_interviews: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityResponse {
    pub participants: Vec<ParticipantAvailability>,
    pub emails: BTreeMap<String, Availability>,
}
