//! External calendar provider seam and its Microsoft Graph implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::config::CalendarConfig;
use crate::utils::crypto::CipherError;
use crate::utils::http::RetryingClient;
use crate::utils::time::{format_graph_datetime, parse_graph_datetime};

const OAUTH_SCOPES: &str = "offline_access User.Read Calendars.ReadWrite";
const SCHEDULE_INTERVAL_MINUTES: u32 = 30;

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("calendar sync is not configured")]
    NotConfigured,
    #[error("no calendar credential stored for user {0}")]
    MissingCredential(uuid::Uuid),
    #[error(transparent)]
    Credential(#[from] CipherError),
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("unexpected provider payload: {0}")]
    Payload(String),
}

impl CalendarError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    /// Present when the provider rotated the refresh token.
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventAttendee {
    pub email: String,
    pub name: Option<String>,
}

/// Everything the provider needs to render one interview as one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventDraft {
    pub subject: String,
    pub body: Option<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub time_zone: String,
    pub location: Option<String>,
    pub attendees: Vec<EventAttendee>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
    pub id: String,
    pub subject: Option<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub time_zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleItem {
    pub status: String,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleInfo {
    pub email: String,
    pub items: Vec<ScheduleItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub notification_url: String,
    pub resource: String,
    pub expiration: DateTime<Utc>,
    pub client_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSubscription {
    pub id: String,
    pub resource: String,
    pub expiration: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    fn authorize_url(&self, state: &str) -> Result<String, CalendarError>;

    async fn exchange_code(&self, code: &str) -> Result<TokenSet, CalendarError>;

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenSet, CalendarError>;

    async fn me(&self, access_token: &str) -> Result<ProviderIdentity, CalendarError>;

    async fn create_event(
        &self,
        access_token: &str,
        draft: &EventDraft,
    ) -> Result<ProviderEvent, CalendarError>;

    async fn patch_event(
        &self,
        access_token: &str,
        event_id: &str,
        draft: &EventDraft,
    ) -> Result<(), CalendarError>;

    async fn delete_event(&self, access_token: &str, event_id: &str) -> Result<(), CalendarError>;

    async fn get_event(
        &self,
        access_token: &str,
        owner_id: &str,
        event_id: &str,
        time_zone: &str,
    ) -> Result<ProviderEvent, CalendarError>;

    async fn get_schedule(
        &self,
        access_token: &str,
        emails: &[String],
        start: NaiveDateTime,
        end: NaiveDateTime,
        time_zone: &str,
    ) -> Result<Vec<ScheduleInfo>, CalendarError>;

    async fn create_subscription(
        &self,
        access_token: &str,
        request: &SubscriptionRequest,
    ) -> Result<ProviderSubscription, CalendarError>;

    async fn renew_subscription(
        &self,
        access_token: &str,
        subscription_id: &str,
        expiration: DateTime<Utc>,
    ) -> Result<ProviderSubscription, CalendarError>;
}

#[derive(Clone)]
pub struct GraphCalendarProvider {
    http: RetryingClient,
    graph_base_url: String,
    login_base_url: String,
    tenant: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl GraphCalendarProvider {
    pub fn new(config: &CalendarConfig) -> Result<Self, CalendarError> {
        let http = RetryingClient::new(
            Duration::from_secs(config.http_timeout_secs),
            config.http_max_attempts,
        )?;
        Ok(Self {
            http,
            graph_base_url: config.graph_base_url.trim_end_matches('/').to_string(),
            login_base_url: config.login_base_url.trim_end_matches('/').to_string(),
            tenant: config.tenant.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        })
    }

    pub fn with_http_client(mut self, http: RetryingClient) -> Self {
        self.http = http;
        self
    }

    fn graph(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.graph_base_url, path.trim_start_matches('/')))
    }

    fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.login_base_url, self.tenant)
    }

    async fn token_grant(&self, form: &[(&str, &str)]) -> Result<TokenSet, CalendarError> {
        let response = self
            .http
            .send(self.http.request(Method::POST, self.token_url()).form(form))
            .await?;
        let token: GraphTokenResponse = read_json(response).await?;
        Ok(TokenSet {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
        })
    }
}

async fn ensure_success(response: Response) -> Result<Response, CalendarError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unreadable body".to_string());
    Err(CalendarError::Api {
        status: status.as_u16(),
        body,
    })
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, CalendarError> {
    let response = ensure_success(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| CalendarError::Payload(e.to_string()))
}

fn event_body(draft: &EventDraft) -> serde_json::Value {
    let attendees: Vec<_> = draft
        .attendees
        .iter()
        .map(|a| {
            json!({
                "emailAddress": { "address": a.email, "name": a.name.clone().unwrap_or_else(|| a.email.clone()) },
                "type": "required",
            })
        })
        .collect();
    let mut body = json!({
        "subject": draft.subject,
        "start": { "dateTime": format_graph_datetime(draft.start), "timeZone": draft.time_zone },
        "end": { "dateTime": format_graph_datetime(draft.end), "timeZone": draft.time_zone },
        "attendees": attendees,
    });
    if let Some(content) = &draft.body {
        body["body"] = json!({ "contentType": "text", "content": content });
    }
    if let Some(location) = &draft.location {
        body["location"] = json!({ "displayName": location });
    }
    body
}

fn parse_event(event: GraphEvent) -> Result<ProviderEvent, CalendarError> {
    let start = parse_graph_datetime(&event.start.date_time)
        .ok_or_else(|| CalendarError::Payload(format!("bad start '{}'", event.start.date_time)))?;
    let end = parse_graph_datetime(&event.end.date_time)
        .ok_or_else(|| CalendarError::Payload(format!("bad end '{}'", event.end.date_time)))?;
    Ok(ProviderEvent {
        id: event.id,
        subject: event.subject,
        start,
        end,
        time_zone: event.start.time_zone.unwrap_or_else(|| "UTC".to_string()),
    })
}

#[async_trait]
impl CalendarProvider for GraphCalendarProvider {
    fn authorize_url(&self, state: &str) -> Result<String, CalendarError> {
        let url = url::Url::parse_with_params(
            &format!("{}/{}/oauth2/v2.0/authorize", self.login_base_url, self.tenant),
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_mode", "query"),
                ("scope", OAUTH_SCOPES),
                ("state", state),
            ],
        )
        .map_err(|e| CalendarError::Payload(format!("invalid login base url: {}", e)))?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet, CalendarError> {
        self.token_grant(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("scope", OAUTH_SCOPES),
        ])
        .await
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenSet, CalendarError> {
        self.token_grant(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", OAUTH_SCOPES),
        ])
        .await
    }

    async fn me(&self, access_token: &str) -> Result<ProviderIdentity, CalendarError> {
        let response = self
            .http
            .send(self.graph(Method::GET, "me").bearer_auth(access_token))
            .await?;
        let me: GraphUser = read_json(response).await?;
        Ok(ProviderIdentity {
            id: me.id,
            email: me.mail.or(me.user_principal_name),
        })
    }

    async fn create_event(
        &self,
        access_token: &str,
        draft: &EventDraft,
    ) -> Result<ProviderEvent, CalendarError> {
        let response = self
            .http
            .send(
                self.graph(Method::POST, "me/events")
                    .bearer_auth(access_token)
                    .header("Prefer", format!("outlook.timezone=\"{}\"", draft.time_zone))
                    .json(&event_body(draft)),
            )
            .await?;
        parse_event(read_json(response).await?)
    }

    async fn patch_event(
        &self,
        access_token: &str,
        event_id: &str,
        draft: &EventDraft,
    ) -> Result<(), CalendarError> {
        let response = self
            .http
            .send(
                self.graph(Method::PATCH, &format!("me/events/{}", event_id))
                    .bearer_auth(access_token)
                    .json(&event_body(draft)),
            )
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn delete_event(&self, access_token: &str, event_id: &str) -> Result<(), CalendarError> {
        let response = self
            .http
            .send(
                self.graph(Method::DELETE, &format!("me/events/{}", event_id))
                    .bearer_auth(access_token),
            )
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn get_event(
        &self,
        access_token: &str,
        owner_id: &str,
        event_id: &str,
        time_zone: &str,
    ) -> Result<ProviderEvent, CalendarError> {
        let response = self
            .http
            .send(
                self.graph(Method::GET, &format!("users/{}/events/{}", owner_id, event_id))
                    .bearer_auth(access_token)
                    .header("Prefer", format!("outlook.timezone=\"{}\"", time_zone))
                    .query(&[("$select", "id,subject,start,end")]),
            )
            .await?;
        parse_event(read_json(response).await?)
    }

    async fn get_schedule(
        &self,
        access_token: &str,
        emails: &[String],
        start: NaiveDateTime,
        end: NaiveDateTime,
        time_zone: &str,
    ) -> Result<Vec<ScheduleInfo>, CalendarError> {
        let body = json!({
            "schedules": emails,
            "startTime": { "dateTime": format_graph_datetime(start), "timeZone": time_zone },
            "endTime": { "dateTime": format_graph_datetime(end), "timeZone": time_zone },
            "availabilityViewInterval": SCHEDULE_INTERVAL_MINUTES,
        });
        let response = self
            .http
            .send(
                self.graph(Method::POST, "me/calendar/getSchedule")
                    .bearer_auth(access_token)
                    .header("Prefer", format!("outlook.timezone=\"{}\"", time_zone))
                    .json(&body),
            )
            .await?;
        let schedules: GraphCollection<GraphSchedule> = read_json(response).await?;
        Ok(schedules
            .value
            .into_iter()
            .map(|s| ScheduleInfo {
                email: s.schedule_id,
                items: s
                    .schedule_items
                    .into_iter()
                    .map(|item| ScheduleItem {
                        status: item.status,
                        start: item.start.and_then(|t| parse_graph_datetime(&t.date_time)),
                        end: item.end.and_then(|t| parse_graph_datetime(&t.date_time)),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn create_subscription(
        &self,
        access_token: &str,
        request: &SubscriptionRequest,
    ) -> Result<ProviderSubscription, CalendarError> {
        let mut body = json!({
            "changeType": "updated,deleted",
            "notificationUrl": request.notification_url,
            "resource": request.resource,
            "expirationDateTime": request.expiration.to_rfc3339(),
        });
        if let Some(state) = &request.client_state {
            body["clientState"] = json!(state);
        }
        let response = self
            .http
            .send(
                self.graph(Method::POST, "subscriptions")
                    .bearer_auth(access_token)
                    .json(&body),
            )
            .await?;
        let sub: GraphSubscription = read_json(response).await?;
        Ok(sub.into())
    }

    async fn renew_subscription(
        &self,
        access_token: &str,
        subscription_id: &str,
        expiration: DateTime<Utc>,
    ) -> Result<ProviderSubscription, CalendarError> {
        let response = self
            .http
            .send(
                self.graph(Method::PATCH, &format!("subscriptions/{}", subscription_id))
                    .bearer_auth(access_token)
                    .json(&json!({ "expirationDateTime": expiration.to_rfc3339() })),
            )
            .await?;
        let sub: GraphSubscription = read_json(response).await?;
        Ok(sub.into())
    }
}

#[derive(Debug, Deserialize)]
struct GraphTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    id: String,
    mail: Option<String>,
    user_principal_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphDateTime {
    date_time: String,
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphEvent {
    id: String,
    subject: Option<String>,
    start: GraphDateTime,
    end: GraphDateTime,
}

#[derive(Debug, Deserialize)]
struct GraphCollection<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphSchedule {
    schedule_id: String,
    #[serde(default)]
    schedule_items: Vec<GraphScheduleItem>,
}

#[derive(Debug, Deserialize)]
struct GraphScheduleItem {
    status: String,
    start: Option<GraphDateTime>,
    end: Option<GraphDateTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphSubscription {
    id: String,
    resource: String,
    expiration_date_time: DateTime<Utc>,
}

impl From<GraphSubscription> for ProviderSubscription {
    fn from(sub: GraphSubscription) -> Self {
        Self {
            id: sub.id,
            resource: sub.resource,
            expiration: sub.expiration_date_time,
        }
    }
}
