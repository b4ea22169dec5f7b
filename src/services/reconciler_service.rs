//! Applies provider change notifications to local interviews. Each
//! notification is handled on its own transaction with its own token
//! refresh, so one bad item never rolls back the rest of the batch.

use serde::Serialize;
use sqlx::PgPool;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::dto::calendar_dto::ChangeNotification;
use crate::error::{Error, Result};
use crate::services::calendar_service::CalendarAdapter;
use crate::services::interview_service::{InterviewService, ProviderUpdate};
use crate::services::{calendar_link_service, interview_repo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Cancelled,
    Updated,
    Unchanged,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileFailure {
    pub event_id: Option<String>,
    pub change_type: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub received: usize,
    pub cancelled: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failures: Vec<ReconcileFailure>,
}

impl ReconcileReport {
    fn count(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Cancelled => self.cancelled += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Skipped => self.skipped += 1,
        }
    }
}

/// Constant-time `clientState` check; anything passes when no secret is
/// configured.
pub fn client_state_matches(expected: Option<&str>, provided: Option<&str>) -> bool {
    match (expected, provided) {
        (None, _) => true,
        (Some(expected), Some(provided)) => {
            ConstantTimeEq::ct_eq(provided.as_bytes(), expected.as_bytes()).into()
        }
        (Some(_), None) => false,
    }
}

#[derive(Clone)]
pub struct Reconciler {
    pool: PgPool,
    adapter: CalendarAdapter,
    interviews: InterviewService,
    client_state: Option<String>,
}

impl Reconciler {
    pub fn new(
        pool: PgPool,
        adapter: CalendarAdapter,
        interviews: InterviewService,
        client_state: Option<String>,
    ) -> Self {
        Self {
            pool,
            adapter,
            interviews,
            client_state,
        }
    }

    pub async fn handle(&self, notifications: &[ChangeNotification]) -> ReconcileReport {
        let mut report = ReconcileReport {
            received: notifications.len(),
            ..Default::default()
        };

        for notification in notifications {
            if !client_state_matches(self.client_state.as_deref(), notification.client_state.as_deref()) {
                warn!(
                    subscription_id = ?notification.subscription_id,
                    "calendar notification with mismatched clientState skipped"
                );
                report.count(Outcome::Skipped);
                continue;
            }

            match self.process(notification).await {
                Ok(outcome) => report.count(outcome),
                Err(err) => {
                    warn!(
                        event_id = ?notification.event_id(),
                        change_type = %notification.change_type,
                        error = %err,
                        "calendar notification failed"
                    );
                    report.failures.push(ReconcileFailure {
                        event_id: notification.event_id().map(str::to_string),
                        change_type: notification.change_type.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            received = report.received,
            cancelled = report.cancelled,
            updated = report.updated,
            failed = report.failures.len(),
            "calendar notifications reconciled"
        );
        report
    }

    async fn process(&self, notification: &ChangeNotification) -> Result<Outcome> {
        let Some(event_id) = notification.event_id() else {
            debug!(resource = %notification.resource, "notification without an event id");
            return Ok(Outcome::Skipped);
        };
        match notification.change_type.trim().to_ascii_lowercase().as_str() {
            "deleted" => self.on_deleted(event_id).await,
            "updated" => self.on_updated(event_id).await,
            other => {
                debug!(change_type = other, event_id, "calendar change type ignored");
                Ok(Outcome::Skipped)
            }
        }
    }

    async fn on_deleted(&self, event_id: &str) -> Result<Outcome> {
        let mut tx = self.pool.begin().await?;
        let Some(link) = calendar_link_service::find_by_event(&mut tx, event_id).await? else {
            debug!(event_id, "deleted event is not linked to an interview");
            return Ok(Outcome::Skipped);
        };
        let applied = self.interviews.cancel_from_provider(&mut tx, &link).await?;
        tx.commit().await?;

        if applied {
            info!(interview_id = %link.interview_id, event_id, "interview cancelled from calendar");
            Ok(Outcome::Cancelled)
        } else {
            Ok(Outcome::Unchanged)
        }
    }

    async fn on_updated(&self, event_id: &str) -> Result<Outcome> {
        let (link, time_zone) = {
            let mut conn = self.pool.acquire().await?;
            let Some(link) = calendar_link_service::find_by_event(&mut conn, event_id).await? else {
                debug!(event_id, "updated event is not linked to an interview");
                return Ok(Outcome::Skipped);
            };
            let time_zone = match interview_repo::get(&mut conn, link.interview_id).await {
                Ok(interview) => interview.time_zone,
                Err(Error::NotFound(_)) => return Ok(Outcome::Skipped),
                Err(err) => return Err(err),
            };
            (link, time_zone)
        };

        // Provider call happens outside any local transaction.
        let fetched = match self
            .adapter
            .fetch_event(&link.encrypted_refresh_token, event_id, &time_zone)
            .await
        {
            Ok(fetched) => fetched,
            Err(err) if err.is_not_found() => {
                debug!(event_id, "updated event vanished before it could be read");
                return Ok(Outcome::Skipped);
            }
            Err(err) => return Err(err.into()),
        };

        let mut tx = self.pool.begin().await?;
        let update = self
            .interviews
            .apply_provider_update(&mut tx, &link, &fetched.value)
            .await?;
        if let Some(rotated) = &fetched.rotated_refresh_token {
            calendar_link_service::store_rotated_token(&mut tx, link.owning_user_id, rotated).await?;
        }
        tx.commit().await?;

        Ok(match update {
            ProviderUpdate::Applied => {
                info!(interview_id = %link.interview_id, event_id, "interview rescheduled from calendar");
                Outcome::Updated
            }
            ProviderUpdate::Unchanged => Outcome::Unchanged,
            ProviderUpdate::Ignored(reason) => {
                debug!(interview_id = %link.interview_id, event_id, reason = %reason, "calendar update ignored");
                Outcome::Skipped
            }
        })
    }
}
