//! Calendar adapter: every provider call decrypts the stored refresh token,
//! refreshes an access token and only then talks to the provider. Access
//! tokens live for a single operation and are never stored.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::config::CalendarConfig;
use crate::models::attendee::Attendee;
use crate::models::interview::Interview;
use crate::models::slot::Slot;
use crate::services::calendar_provider::{
    CalendarError, CalendarProvider, EventAttendee, EventDraft, GraphCalendarProvider,
    ProviderEvent, ProviderIdentity, ProviderSubscription, ScheduleItem, SubscriptionRequest,
};
use crate::services::slot_ledger;
use crate::utils::crypto::TokenCipher;
use crate::utils::time::{overlaps, slot_window};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Busy,
    Tentative,
    OutOfOffice,
    WorkingElsewhere,
}

impl Availability {
    pub fn from_provider_status(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "busy" => Self::Busy,
            "tentative" => Self::Tentative,
            "oof" | "outofoffice" => Self::OutOfOffice,
            "workingelsewhere" => Self::WorkingElsewhere,
            _ => Self::Available,
        }
    }

    fn severity(&self) -> u8 {
        match self {
            Self::Available => 0,
            Self::Tentative => 1,
            Self::WorkingElsewhere => 2,
            Self::OutOfOffice => 3,
            Self::Busy => 4,
        }
    }
}

/// Most restrictive status among the items touching the window; an empty
/// schedule is available.
pub fn summarize(items: &[ScheduleItem], start: NaiveDateTime, end: NaiveDateTime) -> Availability {
    items
        .iter()
        .filter(|item| match (item.start, item.end) {
            (Some(s), Some(e)) => overlaps(s, e, start, end),
            _ => true,
        })
        .map(|item| Availability::from_provider_status(&item.status))
        .max_by_key(Availability::severity)
        .unwrap_or(Availability::Available)
}

/// Result of a provider call plus the re-encrypted refresh token when the
/// provider rotated it; callers persist the rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synced<T> {
    pub value: T,
    pub rotated_refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Connected {
    pub encrypted_refresh_token: String,
    pub access_token: String,
    pub identity: ProviderIdentity,
}

struct Session {
    access_token: String,
    rotated_refresh_token: Option<String>,
}

/// Contact details for internal participants, keyed by user id.
pub type Directory = HashMap<Uuid, (String, String)>;

/// One event per interview, built from the first live slot only.
pub fn build_event_draft(
    interview: &Interview,
    slots: &[Slot],
    attendees: &[Attendee],
    directory: &Directory,
) -> Option<EventDraft> {
    let slot = slot_ledger::primary_slot(slots)?;
    let (start, end) = slot_window(slot);

    let mut seen = HashSet::new();
    let mut event_attendees = Vec::new();
    for attendee in attendees {
        let contact = match (attendee.email(), attendee.participant_id) {
            (Some(email), _) => Some((email.to_string(), attendee.name.clone())),
            (None, Some(id)) => directory
                .get(&id)
                .map(|(name, email)| (email.clone(), attendee.name.clone().or(Some(name.clone())))),
            (None, None) => None,
        };
        if let Some((email, name)) = contact {
            if seen.insert(email.to_ascii_lowercase()) {
                event_attendees.push(EventAttendee { email, name });
            }
        }
    }

    Some(EventDraft {
        subject: interview.title.clone(),
        body: interview.notes.clone(),
        start,
        end,
        time_zone: interview.time_zone.clone(),
        location: interview.location.clone(),
        attendees: event_attendees,
    })
}

#[derive(Clone)]
pub struct CalendarAdapter {
    provider: Arc<dyn CalendarProvider>,
    cipher: TokenCipher,
}

impl CalendarAdapter {
    pub fn new(provider: Arc<dyn CalendarProvider>, cipher: TokenCipher) -> Self {
        Self { provider, cipher }
    }

    pub fn from_config(config: &CalendarConfig) -> Result<Self, CalendarError> {
        let provider = GraphCalendarProvider::new(config)?;
        Ok(Self::new(Arc::new(provider), TokenCipher::new(&config.token_key)))
    }

    pub fn authorize_url(&self, state: &str) -> Result<String, CalendarError> {
        self.provider.authorize_url(state)
    }

    async fn session(&self, encrypted_refresh_token: &str) -> Result<Session, CalendarError> {
        let refresh_token = self.cipher.decrypt(encrypted_refresh_token)?;
        let tokens = self.provider.refresh_access_token(&refresh_token).await?;
        let rotated_refresh_token = match tokens.refresh_token {
            Some(rotated) if rotated != refresh_token => Some(self.cipher.encrypt(&rotated)?),
            _ => None,
        };
        Ok(Session {
            access_token: tokens.access_token,
            rotated_refresh_token,
        })
    }

    /// Authorization-code callback: exchanges the code and encrypts the
    /// refresh token for storage.
    pub async fn connect(&self, code: &str) -> Result<Connected, CalendarError> {
        let tokens = self.provider.exchange_code(code).await?;
        let refresh_token = tokens.refresh_token.ok_or_else(|| {
            CalendarError::Payload("authorization response carried no refresh token".into())
        })?;
        let identity = self.provider.me(&tokens.access_token).await?;
        Ok(Connected {
            encrypted_refresh_token: self.cipher.encrypt(&refresh_token)?,
            access_token: tokens.access_token,
            identity,
        })
    }

    pub async fn access_token(&self, encrypted_refresh_token: &str) -> Result<Synced<String>, CalendarError> {
        let session = self.session(encrypted_refresh_token).await?;
        Ok(Synced {
            value: session.access_token,
            rotated_refresh_token: session.rotated_refresh_token,
        })
    }

    pub async fn create_event(
        &self,
        encrypted_refresh_token: &str,
        draft: &EventDraft,
    ) -> Result<Synced<String>, CalendarError> {
        let session = self.session(encrypted_refresh_token).await?;
        let event = self.provider.create_event(&session.access_token, draft).await?;
        Ok(Synced {
            value: event.id,
            rotated_refresh_token: session.rotated_refresh_token,
        })
    }

    pub async fn patch_event(
        &self,
        encrypted_refresh_token: &str,
        event_id: &str,
        draft: &EventDraft,
    ) -> Result<Synced<()>, CalendarError> {
        let session = self.session(encrypted_refresh_token).await?;
        self.provider
            .patch_event(&session.access_token, event_id, draft)
            .await?;
        Ok(Synced {
            value: (),
            rotated_refresh_token: session.rotated_refresh_token,
        })
    }

    /// `value` is `false` when the provider no longer had the event.
    pub async fn delete_event(
        &self,
        encrypted_refresh_token: &str,
        event_id: &str,
    ) -> Result<Synced<bool>, CalendarError> {
        let session = self.session(encrypted_refresh_token).await?;
        let existed = match self.provider.delete_event(&session.access_token, event_id).await {
            Ok(()) => true,
            Err(err) if err.is_not_found() => {
                debug!(event_id, "calendar event already gone");
                false
            }
            Err(err) => return Err(err),
        };
        Ok(Synced {
            value: existed,
            rotated_refresh_token: session.rotated_refresh_token,
        })
    }

    /// Resolves the owner's provider identity and fetches the event from the
    /// owner's calendar, with times expressed in `time_zone`.
    pub async fn fetch_event(
        &self,
        encrypted_refresh_token: &str,
        event_id: &str,
        time_zone: &str,
    ) -> Result<Synced<ProviderEvent>, CalendarError> {
        let session = self.session(encrypted_refresh_token).await?;
        let owner = self.provider.me(&session.access_token).await?;
        let event = self
            .provider
            .get_event(&session.access_token, &owner.id, event_id, time_zone)
            .await?;
        Ok(Synced {
            value: event,
            rotated_refresh_token: session.rotated_refresh_token,
        })
    }

    pub async fn free_busy(
        &self,
        encrypted_refresh_token: &str,
        emails: &[String],
        start: NaiveDateTime,
        end: NaiveDateTime,
        time_zone: &str,
    ) -> Result<Synced<BTreeMap<String, Availability>>, CalendarError> {
        let session = self.session(encrypted_refresh_token).await?;
        let schedules = self
            .provider
            .get_schedule(&session.access_token, emails, start, end, time_zone)
            .await?;

        let mut result: BTreeMap<String, Availability> = emails
            .iter()
            .map(|e| (e.to_ascii_lowercase(), Availability::Available))
            .collect();
        for schedule in schedules {
            result.insert(
                schedule.email.to_ascii_lowercase(),
                summarize(&schedule.items, start, end),
            );
        }
        Ok(Synced {
            value: result,
            rotated_refresh_token: session.rotated_refresh_token,
        })
    }

    pub async fn create_subscription(
        &self,
        access_token: &str,
        request: &SubscriptionRequest,
    ) -> Result<ProviderSubscription, CalendarError> {
        self.provider.create_subscription(access_token, request).await
    }

    pub async fn renew_subscription(
        &self,
        encrypted_refresh_token: &str,
        subscription_id: &str,
        expiration: DateTime<Utc>,
    ) -> Result<Synced<DateTime<Utc>>, CalendarError> {
        let session = self.session(encrypted_refresh_token).await?;
        let sub = self
            .provider
            .renew_subscription(&session.access_token, subscription_id, expiration)
            .await?;
        Ok(Synced {
            value: sub.expiration,
            rotated_refresh_token: session.rotated_refresh_token,
        })
    }
}
