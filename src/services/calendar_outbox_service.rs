//! Calendar side effects recorded inside the interview transaction and
//! executed against the provider once it has committed.

use sqlx::{PgConnection, PgPool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::calendar::{CalendarLink, CalendarOutboxEntry, OutboxAction};
use crate::models::interview::InterviewStatus;
use crate::services::calendar_provider::CalendarError;
use crate::services::calendar_service::{build_event_draft, CalendarAdapter};
use crate::services::{attendee_registry, calendar_link_service, interview_repo, slot_ledger, user_service};

/// A claim older than this is treated as abandoned by a crashed worker.
const STALE_CLAIM_MINUTES: i32 = 10;

const OUTBOX_COLUMNS: &str = "id, interview_id, action, owning_user_id, external_event_id, encrypted_refresh_token, status, attempts, max_attempts, next_retry_at, last_error, created_at";

async fn insert(
    conn: &mut PgConnection,
    interview_id: Uuid,
    action: OutboxAction,
    owning_user_id: Uuid,
    event_id: Option<&str>,
    encrypted_refresh_token: Option<&str>,
) -> Result<Uuid> {
    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO calendar_outbox (interview_id, action, owning_user_id, external_event_id, encrypted_refresh_token)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(interview_id)
    .bind(action.as_str())
    .bind(owning_user_id)
    .bind(event_id)
    .bind(encrypted_refresh_token)
    .fetch_one(&mut *conn)
    .await?;
    debug!(%interview_id, action = action.as_str(), outbox_id = %id, "calendar side effect queued");
    Ok(id)
}

/// Queues event creation on the owner's calendar. Returns `None` when the
/// owner never connected a calendar; the interview then simply stays
/// unsynced.
pub async fn enqueue_create(conn: &mut PgConnection, interview_id: Uuid, owner_id: Uuid) -> Result<Option<Uuid>> {
    let Some(credential) = calendar_link_service::credential(conn, owner_id).await? else {
        warn!(%interview_id, user_id = %owner_id, "calendar sync requested but no calendar is connected");
        return Ok(None);
    };
    let id = insert(
        conn,
        interview_id,
        OutboxAction::Create,
        owner_id,
        None,
        Some(&credential.encrypted_refresh_token),
    )
    .await?;
    Ok(Some(id))
}

pub async fn enqueue_patch(conn: &mut PgConnection, link: &CalendarLink) -> Result<Uuid> {
    insert(
        conn,
        link.interview_id,
        OutboxAction::Patch,
        link.owning_user_id,
        Some(&link.external_event_id),
        Some(&link.encrypted_refresh_token),
    )
    .await
}

/// The event id and token are snapshotted so the delete still runs if the
/// link changes before the worker gets to it.
pub async fn enqueue_delete(conn: &mut PgConnection, link: &CalendarLink) -> Result<Uuid> {
    insert(
        conn,
        link.interview_id,
        OutboxAction::Delete,
        link.owning_user_id,
        Some(&link.external_event_id),
        Some(&link.encrypted_refresh_token),
    )
    .await
}

/// Claims the oldest due entry and marks it `processing` on `conn`. Entries a
/// worker claimed but never finished are picked up again once the claim is
/// stale; the provider calls are idempotent per entry.
pub async fn claim_due(conn: &mut PgConnection) -> Result<Option<CalendarOutboxEntry>> {
    let entry = sqlx::query_as::<_, CalendarOutboxEntry>(&format!(
        r#"
        SELECT {OUTBOX_COLUMNS} FROM calendar_outbox
        WHERE (status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= NOW()))
           OR (status = 'processing' AND updated_at < NOW() - make_interval(mins => $1))
        ORDER BY created_at ASC
        FOR UPDATE SKIP LOCKED
        LIMIT 1
        "#
    ))
    .bind(STALE_CLAIM_MINUTES)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(entry) = entry else {
        return Ok(None);
    };
    if entry.status == "processing" {
        warn!(outbox_id = %entry.id, interview_id = %entry.interview_id, "reclaiming stale calendar side effect");
    }
    sqlx::query(
        "UPDATE calendar_outbox SET status = 'processing', attempts = attempts + 1, updated_at = NOW() WHERE id = $1",
    )
    .bind(entry.id)
    .execute(&mut *conn)
    .await?;
    Ok(Some(entry))
}

fn is_permanent(err: &Error) -> bool {
    match err {
        Error::Calendar(CalendarError::Credential(_) | CalendarError::MissingCredential(_)) => true,
        Error::Calendar(CalendarError::Api { status, .. }) => {
            (400..500).contains(status) && *status != 408 && *status != 429
        }
        _ => false,
    }
}

#[derive(Clone)]
pub struct CalendarOutboxService {
    pool: PgPool,
    adapter: CalendarAdapter,
}

impl CalendarOutboxService {
    pub fn new(pool: PgPool, adapter: CalendarAdapter) -> Self {
        Self { pool, adapter }
    }

    /// Claims and executes one due entry. Returns `false` when nothing is due.
    pub async fn run_once(&self) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let entry = claim_due(&mut tx).await?;
        tx.commit().await?;
        let Some(entry) = entry else {
            return Ok(false);
        };

        match self.execute(&entry).await {
            Ok(()) => {
                sqlx::query("UPDATE calendar_outbox SET status = 'done', last_error = NULL, updated_at = NOW() WHERE id = $1")
                    .bind(entry.id)
                    .execute(&self.pool)
                    .await?;
            }
            Err(err) => {
                let attempts = entry.attempts + 1;
                let give_up = is_permanent(&err) || attempts >= entry.max_attempts;
                warn!(
                    outbox_id = %entry.id,
                    interview_id = %entry.interview_id,
                    action = %entry.action,
                    attempts,
                    give_up,
                    error = %err,
                    "calendar side effect failed"
                );
                sqlx::query(
                    r#"
                    UPDATE calendar_outbox
                    SET status = CASE WHEN $2 THEN 'failed' ELSE 'pending' END,
                        last_error = $3,
                        next_retry_at = NOW() + make_interval(secs => LEAST(3600, 30 * power(2::float, GREATEST(0, attempts - 1))::int)),
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(entry.id)
                .bind(give_up)
                .bind(err.to_string())
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(true)
    }

    async fn execute(&self, entry: &CalendarOutboxEntry) -> Result<()> {
        let action: OutboxAction = entry.action.parse().map_err(Error::Internal)?;
        match action {
            OutboxAction::Create => self.create(entry).await,
            OutboxAction::Patch => self.patch(entry).await,
            OutboxAction::Delete => self.delete(entry).await,
        }
    }

    async fn draft_for(&self, interview_id: Uuid) -> Result<Option<crate::services::calendar_provider::EventDraft>> {
        let mut conn = self.pool.acquire().await?;
        let interview = match interview_repo::get(&mut conn, interview_id).await {
            Ok(interview) => interview,
            Err(Error::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        let slots = slot_ledger::list(&mut conn, interview_id).await?;
        let attendees = attendee_registry::list(&mut conn, interview_id).await?;
        let participant_ids: Vec<Uuid> = attendees.iter().filter_map(|a| a.participant_id).collect();
        let directory = user_service::contacts(&mut conn, &participant_ids).await?;
        Ok(build_event_draft(&interview, &slots, &attendees, &directory))
    }

    async fn persist_rotation(&self, owner_id: Uuid, rotated: Option<String>) -> Result<()> {
        if let Some(rotated) = rotated {
            let mut conn = self.pool.acquire().await?;
            calendar_link_service::store_rotated_token(&mut conn, owner_id, &rotated).await?;
        }
        Ok(())
    }

    async fn create(&self, entry: &CalendarOutboxEntry) -> Result<()> {
        {
            let mut conn = self.pool.acquire().await?;
            if calendar_link_service::find_by_interview(&mut conn, entry.interview_id)
                .await?
                .is_some()
            {
                debug!(interview_id = %entry.interview_id, "calendar event already linked");
                return Ok(());
            }
        }
        let Some(draft) = self.draft_for(entry.interview_id).await? else {
            debug!(interview_id = %entry.interview_id, "nothing to mirror to the calendar");
            return Ok(());
        };
        let token = entry
            .encrypted_refresh_token
            .as_deref()
            .ok_or(CalendarError::MissingCredential(entry.owning_user_id))?;

        let created = self.adapter.create_event(token, &draft).await?;
        let stored_token = created.rotated_refresh_token.as_deref().unwrap_or(token);

        // The row lock orders this against cancel and reject: either they
        // already closed the interview, or they will see the link.
        let mut tx = self.pool.begin().await?;
        let closed = match interview_repo::lock(&mut tx, entry.interview_id).await {
            Ok(interview) => matches!(
                interview.status,
                InterviewStatus::Cancelled | InterviewStatus::Rejected
            ),
            Err(Error::NotFound(_)) => true,
            Err(err) => return Err(err),
        };
        let link = calendar_link_service::insert(
            &mut tx,
            entry.interview_id,
            &created.value,
            stored_token,
            entry.owning_user_id,
        )
        .await?;
        if let Some(rotated) = &created.rotated_refresh_token {
            calendar_link_service::store_rotated_token(&mut tx, entry.owning_user_id, rotated).await?;
        }
        if closed {
            enqueue_delete(&mut tx, &link).await?;
        }
        tx.commit().await?;
        info!(
            interview_id = %entry.interview_id,
            event_id = %created.value,
            closed,
            "calendar event created"
        );
        Ok(())
    }

    async fn patch(&self, entry: &CalendarOutboxEntry) -> Result<()> {
        let link = {
            let mut conn = self.pool.acquire().await?;
            calendar_link_service::find_by_interview(&mut conn, entry.interview_id).await?
        };
        let Some(link) = link else {
            debug!(interview_id = %entry.interview_id, "calendar link gone; patch skipped");
            return Ok(());
        };
        let Some(draft) = self.draft_for(entry.interview_id).await? else {
            return Ok(());
        };
        let patched = self
            .adapter
            .patch_event(&link.encrypted_refresh_token, &link.external_event_id, &draft)
            .await?;
        self.persist_rotation(link.owning_user_id, patched.rotated_refresh_token).await?;
        info!(interview_id = %entry.interview_id, event_id = %link.external_event_id, "calendar event updated");
        Ok(())
    }

    async fn delete(&self, entry: &CalendarOutboxEntry) -> Result<()> {
        let (Some(event_id), Some(token)) = (
            entry.external_event_id.as_deref(),
            entry.encrypted_refresh_token.as_deref(),
        ) else {
            return Err(Error::Internal(format!(
                "calendar delete {} is missing its event snapshot",
                entry.id
            )));
        };
        let deleted = self.adapter.delete_event(token, event_id).await?;
        let mut tx = self.pool.begin().await?;
        calendar_link_service::delete_event_link(&mut tx, entry.interview_id, event_id).await?;
        if let Some(rotated) = &deleted.rotated_refresh_token {
            calendar_link_service::store_rotated_token(&mut tx, entry.owning_user_id, rotated).await?;
        }
        tx.commit().await?;
        info!(
            interview_id = %entry.interview_id,
            event_id,
            existed = deleted.value,
            "calendar event deleted"
        );
        Ok(())
    }
}
