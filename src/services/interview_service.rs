//! Interview aggregate. Every mutation runs in one transaction holding the
//! interview row lock, moves status only through
//! [`interview_state::transition`], appends history, projects the submission
//! status and queues notifications and calendar side effects on the same
//! transaction.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, ReschedulePolicy};
use crate::dto::interview_dto::{
    categorized, to_new_slots, AcceptInterviewPayload, CompleteInterviewPayload,
    CreateInterviewPayload, InterviewDetail, ProposeSlotsPayload, ReasonPayload,
    ReschedulePayload,
};
use crate::error::{Error, Result};
use crate::models::attendee::AttendeeCategory;
use crate::models::calendar::CalendarLink;
use crate::models::history::HistoryEntry;
use crate::models::interview::{Interview, InterviewStatus};
use crate::models::slot::{Slot, SlotStatus};
use crate::models::user::{Actor, User};
use crate::services::calendar_provider::ProviderEvent;
use crate::services::history_service::{self, HistoryRecord};
use crate::services::interview_repo::{self, DetailsUpdate, NewInterview};
use crate::services::interview_state::{self, InterviewAction, Transition};
use crate::services::notification_service::{self, NotificationEvent};
use crate::services::projection_service::{self, Projection};
use crate::services::{
    attendee_registry, calendar_link_service, calendar_outbox_service, job_service, slot_ledger,
    submission_service, user_service,
};
use crate::utils::time::{slot_from_window, slot_window};
use crate::utils::validation::require_reason;

const MAX_RATING: i64 = 5;

#[derive(Debug, Clone)]
pub enum AcceptOutcome {
    Accepted(InterviewDetail),
    /// The interview was already accepted; nothing was written.
    AlreadyAccepted(InterviewDetail),
}

/// What a provider-side event change did to the local interview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderUpdate {
    Applied,
    /// The event still matches what we last wrote to it.
    Unchanged,
    Ignored(String),
}

fn authorize(actor: &Actor, user: &User, vendor_id: Uuid) -> Result<()> {
    if actor.role.is_vendor_side() && user.vendor_id != Some(vendor_id) {
        return Err(Error::Forbidden(
            "Vendor users may only act on their own submissions".to_string(),
        ));
    }
    Ok(())
}

fn validate_rating(rating: Option<Decimal>) -> Result<()> {
    match rating {
        Some(r) if r < Decimal::ZERO || r > Decimal::from(MAX_RATING) => Err(Error::BadRequest(
            format!("Rating must be between 0 and {}", MAX_RATING),
        )),
        _ => Ok(()),
    }
}

fn notes_of(notes: Option<&str>) -> Option<&str> {
    notes.map(str::trim).filter(|n| !n.is_empty())
}

fn notification_payload(interview: &Interview, slots: &[Slot]) -> JsonValue {
    json!({
        "interview_id": interview.id,
        "program_id": interview.program_id,
        "job_id": interview.job_id,
        "candidate_id": interview.candidate_id,
        "vendor_id": interview.vendor_id,
        "submission_id": interview.submission_id,
        "revision": interview.revision,
        "status": interview.status,
        "title": interview.title,
        "time_zone": interview.time_zone,
        "slots": slots,
    })
}

/// True when the interview already sits in the event's window: accepted on
/// it, or pending with that window as its only slot. Anything else is a real
/// move and resets the interview.
fn is_echo(interview: &Interview, slots: &[Slot], event: &ProviderEvent) -> bool {
    let window = (event.start, event.end);
    match interview.status {
        InterviewStatus::Accepted => slot_ledger::primary_slot(slots)
            .is_some_and(|s| s.status == SlotStatus::Accepted && slot_window(s) == window),
        InterviewStatus::PendingAcceptance => {
            matches!(slots, [only] if only.status == SlotStatus::Pending && slot_window(only) == window)
        }
        _ => false,
    }
}

/// Newer live revision of the same lineage, if any. Takes the lineage lock so
/// a next round cannot be created while the caller holds the row.
async fn superseded_by(conn: &mut PgConnection, interview: &Interview) -> Result<Option<i32>> {
    interview_repo::lock_lineage(conn, interview.job_id, interview.candidate_id).await?;
    let latest = interview_repo::latest_revision(conn, interview.job_id, interview.candidate_id).await?;
    Ok((latest > interview.revision).then_some(latest))
}

#[derive(Clone)]
pub struct InterviewService {
    pool: PgPool,
    reschedule_policy: ReschedulePolicy,
    notification_url: Option<String>,
    calendar_enabled: bool,
}

impl InterviewService {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        Self {
            pool,
            reschedule_policy: config.reschedule_policy,
            notification_url: config.notification_webhook_url.clone(),
            calendar_enabled: config.calendar.is_some(),
        }
    }

    /// Locks the interview for a mutation by `actor`. Only the newest live
    /// revision of a lineage can change.
    async fn lock_for(&self, conn: &mut PgConnection, actor: &Actor, id: Uuid) -> Result<Interview> {
        let interview = interview_repo::lock(conn, id).await?;
        let user = user_service::require_active(conn, actor.user_id).await?;
        authorize(actor, &user, interview.vendor_id)?;
        if let Some(latest) = superseded_by(conn, &interview).await? {
            return Err(Error::Conflict(format!(
                "Revision {} is superseded by revision {} and can no longer change",
                interview.revision, latest
            )));
        }
        Ok(interview)
    }

    async fn authorize_read(&self, conn: &mut PgConnection, actor: &Actor, vendor_id: Uuid) -> Result<()> {
        let user = user_service::require_active(conn, actor.user_id).await?;
        authorize(actor, &user, vendor_id)
    }

    async fn notify(
        &self,
        conn: &mut PgConnection,
        event: NotificationEvent,
        interview: &Interview,
    ) -> Result<()> {
        let slots = slot_ledger::list(conn, interview.id).await?;
        let payload = notification_payload(interview, &slots);
        notification_service::enqueue(conn, self.notification_url.as_deref(), event, &payload).await?;
        Ok(())
    }

    async fn record(
        &self,
        conn: &mut PgConnection,
        interview_id: Uuid,
        action: &str,
        transition: Option<(InterviewStatus, InterviewStatus)>,
        actor_id: Option<Uuid>,
        payload: Option<JsonValue>,
    ) -> Result<HistoryEntry> {
        history_service::append(
            conn,
            HistoryRecord {
                interview_id,
                action,
                old_state: transition.map(|(from, _)| from),
                new_state: transition.map(|(_, to)| to),
                actor_id,
                payload,
            },
        )
        .await
    }

    async fn queue_create(&self, conn: &mut PgConnection, interview: &Interview, owner_id: Uuid) -> Result<()> {
        if !interview.calendar_sync {
            return Ok(());
        }
        if !self.calendar_enabled {
            debug!(interview_id = %interview.id, "calendar sync requested but calendar integration is disabled");
            return Ok(());
        }
        calendar_outbox_service::enqueue_create(conn, interview.id, owner_id).await?;
        Ok(())
    }

    async fn queue_patch(&self, conn: &mut PgConnection, interview_id: Uuid) -> Result<bool> {
        match calendar_link_service::find_by_interview(conn, interview_id).await? {
            Some(link) => {
                calendar_outbox_service::enqueue_patch(conn, &link).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn queue_delete(&self, conn: &mut PgConnection, interview_id: Uuid) -> Result<()> {
        if let Some(link) = calendar_link_service::find_by_interview(conn, interview_id).await? {
            calendar_outbox_service::enqueue_delete(conn, &link).await?;
        }
        Ok(())
    }

    /// Side effects of an interview becoming visible to the vendor.
    async fn announce(&self, conn: &mut PgConnection, interview: &Interview, owner_id: Uuid) -> Result<()> {
        projection_service::project(conn, interview, Projection::Scheduled).await?;
        self.notify(conn, NotificationEvent::Scheduled, interview).await?;
        self.queue_create(conn, interview, owner_id).await
    }

    async fn load_detail(&self, conn: &mut PgConnection, interview: Interview) -> Result<InterviewDetail> {
        let slots = slot_ledger::list(conn, interview.id).await?;
        let attendees = attendee_registry::list(conn, interview.id).await?;
        let custom_fields: BTreeMap<String, JsonValue> = interview_repo::custom_fields(conn, interview.id)
            .await?
            .into_iter()
            .map(|f| (f.field_key, f.value))
            .collect();
        let feedback = interview_repo::feedback(conn, interview.id).await?;
        let calendar_synced = calendar_link_service::find_by_interview(conn, interview.id)
            .await?
            .is_some();
        Ok(InterviewDetail {
            reschedule_allowed: interview_state::reschedule_allowed(interview.status),
            interview,
            slots,
            attendees,
            custom_fields,
            feedback,
            calendar_synced,
        })
    }

    pub async fn detail(&self, actor: &Actor, id: Uuid) -> Result<InterviewDetail> {
        let mut conn = self.pool.acquire().await?;
        let interview = interview_repo::get(&mut conn, id).await?;
        self.authorize_read(&mut conn, actor, interview.vendor_id).await?;
        self.load_detail(&mut conn, interview).await
    }

    /// Every live revision of a `(job, candidate)` pair, oldest first. Vendor
    /// users only see revisions of their own submission.
    pub async fn lineage(&self, actor: &Actor, job_id: Uuid, candidate_id: Uuid) -> Result<Vec<Interview>> {
        let mut conn = self.pool.acquire().await?;
        let user = user_service::require_active(&mut conn, actor.user_id).await?;
        let mut interviews = interview_repo::lineage(&mut conn, job_id, candidate_id).await?;
        interviews.retain(|i| authorize(actor, &user, i.vendor_id).is_ok());
        Ok(interviews)
    }

    pub async fn history(&self, actor: &Actor, id: Uuid) -> Result<Vec<HistoryEntry>> {
        let mut conn = self.pool.acquire().await?;
        let interview = interview_repo::get(&mut conn, id).await?;
        self.authorize_read(&mut conn, actor, interview.vendor_id).await?;
        history_service::list(&self.pool, id).await
    }

    pub async fn create(&self, actor: &Actor, payload: CreateInterviewPayload) -> Result<InterviewDetail> {
        let slots = to_new_slots(&payload.slots);
        slot_ledger::validate_new_slots(&slots)?;

        let mut attendees = categorized(AttendeeCategory::Interviewer, payload.interviewers);
        attendees.extend(categorized(AttendeeCategory::External, payload.external_attendees));
        attendees.extend(categorized(AttendeeCategory::Additional, payload.additional_attendees));
        if attendees.is_empty() {
            return Err(Error::BadRequest("At least one attendee is required".to_string()));
        }
        let attendees = attendee_registry::validate(&attendees)?;

        let mut tx = self.pool.begin().await?;
        let user = user_service::require_active(&mut tx, actor.user_id).await?;
        let job = job_service::ensure_schedulable(&mut tx, payload.job_id).await?;
        let program_id = payload.program_id.unwrap_or(job.program_id);
        if program_id != job.program_id {
            return Err(Error::BadRequest(format!(
                "Job {} does not belong to program {}",
                job.id, program_id
            )));
        }
        let submission = submission_service::find_for_lineage(&mut tx, job.id, payload.candidate_id)
            .await?
            .ok_or_else(|| {
                Error::Precondition(format!(
                    "Candidate {} has no submission for job {}",
                    payload.candidate_id, job.id
                ))
            })?;
        authorize(actor, &user, submission.vendor_id)?;

        interview_repo::lock_lineage(&mut tx, job.id, payload.candidate_id).await?;
        let lineage = interview_repo::lineage(&mut tx, job.id, payload.candidate_id).await?;
        if let Some(latest) = lineage.last() {
            if !latest.status.allows_next_revision() {
                return Err(Error::Conflict(format!(
                    "Revision {} is {}; a new round needs the previous one accepted or completed",
                    latest.revision, latest.status
                )));
            }
        }
        let revision = interview_repo::max_revision(&mut tx, job.id, payload.candidate_id).await? + 1;
        let status = if payload.save_as_draft {
            InterviewStatus::Draft
        } else {
            InterviewStatus::PendingAcceptance
        };

        let interview = interview_repo::insert(
            &mut tx,
            NewInterview {
                program_id,
                job_id: job.id,
                candidate_id: payload.candidate_id,
                vendor_id: submission.vendor_id,
                submission_id: submission.id,
                status,
                revision,
                title: payload.title.trim(),
                location: payload.location.as_deref(),
                time_zone: payload.time_zone.trim(),
                notes: notes_of(payload.notes.as_deref()),
                calendar_sync: payload.calendar_sync,
                created_by: actor.user_id,
            },
        )
        .await?;
        slot_ledger::insert(&mut tx, interview.id, &slots, false).await?;
        attendee_registry::insert(&mut tx, interview.id, &attendees).await?;
        let custom_fields: Vec<(String, JsonValue)> = payload.custom_fields.into_iter().collect();
        interview_repo::replace_custom_fields(&mut tx, interview.id, &custom_fields).await?;

        self.record(
            &mut tx,
            interview.id,
            history_service::INTERVIEW_SCHEDULED,
            Some((status, status)),
            Some(actor.user_id),
            Some(json!({ "revision": revision, "draft": payload.save_as_draft })),
        )
        .await?;
        if revision > 1 {
            self.record(
                &mut tx,
                interview.id,
                history_service::NEXT_ROUND_SCHEDULED,
                None,
                Some(actor.user_id),
                Some(json!({ "revision": revision })),
            )
            .await?;
        }
        if status != InterviewStatus::Draft {
            self.announce(&mut tx, &interview, actor.user_id).await?;
        }

        let detail = self.load_detail(&mut tx, interview).await?;
        tx.commit().await?;
        info!(
            interview_id = %detail.interview.id,
            revision,
            status = %detail.interview.status,
            "interview created"
        );
        Ok(detail)
    }

    pub async fn publish(&self, actor: &Actor, id: Uuid) -> Result<InterviewDetail> {
        let mut tx = self.pool.begin().await?;
        let interview = self.lock_for(&mut tx, actor, id).await?;
        job_service::ensure_schedulable(&mut tx, interview.job_id).await?;
        let transition = interview_state::transition(interview.status, InterviewAction::Publish)?;
        let to = transition.target();

        let interview = interview_repo::set_status(&mut tx, id, to, actor.user_id).await?;
        self.record(
            &mut tx,
            id,
            history_service::INTERVIEW_PUBLISHED,
            Some((transition.source(), to)),
            Some(actor.user_id),
            None,
        )
        .await?;
        self.announce(&mut tx, &interview, actor.user_id).await?;

        let detail = self.load_detail(&mut tx, interview).await?;
        tx.commit().await?;
        info!(interview_id = %id, "interview published");
        Ok(detail)
    }

    pub async fn accept(&self, actor: &Actor, id: Uuid, payload: AcceptInterviewPayload) -> Result<AcceptOutcome> {
        let mut tx = self.pool.begin().await?;
        let interview = self.lock_for(&mut tx, actor, id).await?;

        let from = match interview_state::transition(interview.status, InterviewAction::Accept)? {
            Transition::Unchanged(_) => {
                let detail = self.load_detail(&mut tx, interview).await?;
                tx.commit().await?;
                debug!(interview_id = %id, "interview already accepted");
                return Ok(AcceptOutcome::AlreadyAccepted(detail));
            }
            Transition::Moved { from, .. } => from,
        };
        job_service::ensure_schedulable(&mut tx, interview.job_id).await?;

        let slots = slot_ledger::list(&mut tx, id).await?;
        let updates = slot_ledger::plan_accept(&slots, &payload.slot_ids)?;
        slot_ledger::apply_statuses(&mut tx, &updates).await?;

        let chosen = slots
            .iter()
            .filter(|s| payload.slot_ids.contains(&s.id))
            .min_by_key(|s| (s.interview_date, s.start_time))
            .map(|s| s.id);
        let attendees = attendee_registry::list(&mut tx, id).await?;
        match (
            attendee_registry::find_accepting(&attendees, actor.user_id, payload.attendee_email.as_deref()),
            chosen,
        ) {
            (Some(attendee), Some(slot_id)) => {
                attendee_registry::mark_accepted(&mut tx, attendee.id, slot_id).await?;
            }
            _ => debug!(interview_id = %id, user_id = %actor.user_id, "accepting actor is not a listed attendee"),
        }

        if let Some(notes) = notes_of(payload.notes.as_deref()) {
            interview_repo::append_notes(&mut tx, id, notes).await?;
        }
        let interview = interview_repo::set_status(&mut tx, id, InterviewStatus::Accepted, actor.user_id).await?;
        self.record(
            &mut tx,
            id,
            history_service::INTERVIEW_ACCEPTED,
            Some((from, InterviewStatus::Accepted)),
            Some(actor.user_id),
            Some(json!({ "slot_ids": payload.slot_ids })),
        )
        .await?;
        projection_service::project(&mut tx, &interview, Projection::Accepted).await?;
        let event = if from == InterviewStatus::PendingConfirmation {
            NotificationEvent::Confirmed
        } else {
            NotificationEvent::Accepted
        };
        self.notify(&mut tx, event, &interview).await?;
        self.queue_patch(&mut tx, id).await?;

        let detail = self.load_detail(&mut tx, interview).await?;
        tx.commit().await?;
        info!(interview_id = %id, from = %from, "interview accepted");
        Ok(AcceptOutcome::Accepted(detail))
    }

    pub async fn propose(&self, actor: &Actor, id: Uuid, payload: ProposeSlotsPayload) -> Result<InterviewDetail> {
        let proposed = to_new_slots(&payload.slots);
        slot_ledger::validate_new_slots(&proposed)?;

        let mut tx = self.pool.begin().await?;
        let interview = self.lock_for(&mut tx, actor, id).await?;
        job_service::ensure_schedulable(&mut tx, interview.job_id).await?;
        let transition = interview_state::transition(
            interview.status,
            InterviewAction::Propose { by: actor.role },
        )?;
        let to = transition.target();

        let slots = slot_ledger::list(&mut tx, id).await?;
        let superseded = slot_ledger::plan_proposal(&slots);
        slot_ledger::mark(&mut tx, &superseded, SlotStatus::Rejected).await?;
        slot_ledger::insert(&mut tx, id, &proposed, true).await?;
        if let Some(notes) = notes_of(payload.notes.as_deref()) {
            interview_repo::append_notes(&mut tx, id, notes).await?;
        }

        let interview = interview_repo::set_status(&mut tx, id, to, actor.user_id).await?;
        self.record(
            &mut tx,
            id,
            history_service::SLOTS_PROPOSED,
            Some((transition.source(), to)),
            Some(actor.user_id),
            Some(json!({ "proposed": proposed.len(), "by": actor.role.as_str() })),
        )
        .await?;
        projection_service::project(&mut tx, &interview, Projection::Proposed(to)).await?;
        self.notify(&mut tx, NotificationEvent::Rescheduled, &interview).await?;
        self.queue_patch(&mut tx, id).await?;

        let detail = self.load_detail(&mut tx, interview).await?;
        tx.commit().await?;
        info!(interview_id = %id, status = %to, "new slots proposed");
        Ok(detail)
    }

    pub async fn reschedule(&self, actor: &Actor, id: Uuid, payload: ReschedulePayload) -> Result<InterviewDetail> {
        let slots = to_new_slots(&payload.slots);
        slot_ledger::validate_new_slots(&slots)?;
        let replacements = payload.attendee_replacements();

        let mut tx = self.pool.begin().await?;
        let interview = self.lock_for(&mut tx, actor, id).await?;
        job_service::ensure_schedulable(&mut tx, interview.job_id).await?;
        interview_state::enforce_reschedule_policy(interview.status, self.reschedule_policy)?;
        let transition = interview_state::transition(interview.status, InterviewAction::Reschedule)?;
        let cleared_feedback = if transition.source() == InterviewStatus::Completed {
            interview_repo::delete_feedback(&mut tx, id).await?
        } else {
            None
        };

        let current = attendee_registry::list(&mut tx, id).await?;
        let combined = attendee_registry::plan_replacement(&current, &replacements)?;
        if combined.is_empty() {
            return Err(Error::BadRequest("At least one attendee is required".to_string()));
        }

        slot_ledger::replace(&mut tx, id, &slots).await?;
        attendee_registry::replace_categories(&mut tx, id, &replacements).await?;
        if let Some(fields) = &payload.custom_fields {
            let fields: Vec<(String, JsonValue)> =
                fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            interview_repo::replace_custom_fields(&mut tx, id, &fields).await?;
        }
        let interview = interview_repo::reopen(
            &mut tx,
            id,
            DetailsUpdate {
                title: payload.title.as_deref().map(str::trim),
                location: payload.location.as_deref(),
                time_zone: payload.time_zone.as_deref().map(str::trim),
                notes: payload.notes.as_deref(),
                calendar_sync: payload.calendar_sync,
            },
            actor.user_id,
        )
        .await?;

        self.record(
            &mut tx,
            id,
            history_service::INTERVIEW_RESCHEDULED,
            Some((transition.source(), interview.status)),
            Some(actor.user_id),
            Some(json!({ "slots": slots.len(), "cleared_feedback": cleared_feedback })),
        )
        .await?;
        projection_service::project(&mut tx, &interview, Projection::Rescheduled).await?;
        self.notify(&mut tx, NotificationEvent::Rescheduled, &interview).await?;
        if !self.queue_patch(&mut tx, id).await? {
            self.queue_create(&mut tx, &interview, actor.user_id).await?;
        }

        let detail = self.load_detail(&mut tx, interview).await?;
        tx.commit().await?;
        info!(interview_id = %id, "interview rescheduled");
        Ok(detail)
    }

    pub async fn complete(&self, actor: &Actor, id: Uuid, payload: CompleteInterviewPayload) -> Result<InterviewDetail> {
        validate_rating(payload.rating)?;

        let mut tx = self.pool.begin().await?;
        let interview = self.lock_for(&mut tx, actor, id).await?;
        let transition = interview_state::transition(interview.status, InterviewAction::Complete)?;

        let siblings = interview_repo::siblings(&mut tx, &interview).await?;
        if let Some(done) = siblings.iter().find(|s| s.status == InterviewStatus::Completed) {
            return Err(Error::Conflict(format!(
                "Revision {} of this candidate's interviews is already completed",
                done.revision
            )));
        }
        if interview_repo::feedback(&mut tx, id).await?.is_some() {
            return Err(Error::Conflict("Feedback has already been recorded".to_string()));
        }

        interview_repo::insert_feedback(
            &mut tx,
            id,
            payload.outcome.trim(),
            payload.rating,
            notes_of(payload.notes.as_deref()),
            actor.user_id,
        )
        .await?;
        let interview = interview_repo::set_status(&mut tx, id, transition.target(), actor.user_id).await?;
        self.record(
            &mut tx,
            id,
            history_service::INTERVIEW_COMPLETED,
            Some((transition.source(), interview.status)),
            Some(actor.user_id),
            Some(json!({ "outcome": payload.outcome.trim() })),
        )
        .await?;
        projection_service::project(&mut tx, &interview, Projection::Completed).await?;

        let detail = self.load_detail(&mut tx, interview).await?;
        tx.commit().await?;
        info!(interview_id = %id, "interview completed");
        Ok(detail)
    }

    pub async fn cancel(&self, actor: &Actor, id: Uuid, payload: ReasonPayload) -> Result<InterviewDetail> {
        self.close(actor, id, payload, InterviewAction::Cancel).await
    }

    pub async fn reject(&self, actor: &Actor, id: Uuid, payload: ReasonPayload) -> Result<InterviewDetail> {
        self.close(actor, id, payload, InterviewAction::Reject).await
    }

    async fn close(
        &self,
        actor: &Actor,
        id: Uuid,
        payload: ReasonPayload,
        action: InterviewAction,
    ) -> Result<InterviewDetail> {
        let reason = require_reason(payload.reason.as_deref())?;
        let (slot_status, projection, label) = match action {
            InterviewAction::Reject => (
                SlotStatus::Rejected,
                Projection::Rejected,
                history_service::INTERVIEW_REJECTED,
            ),
            _ => (
                SlotStatus::Cancelled,
                Projection::Cancelled,
                history_service::INTERVIEW_CANCELLED,
            ),
        };

        let mut tx = self.pool.begin().await?;
        let interview = self.lock_for(&mut tx, actor, id).await?;
        let transition = interview_state::transition(interview.status, action)?;

        let interview = interview_repo::close(&mut tx, id, transition.target(), Some(&reason), actor.user_id).await?;
        slot_ledger::mark_all(&mut tx, id, slot_status).await?;
        self.record(
            &mut tx,
            id,
            label,
            Some((transition.source(), interview.status)),
            Some(actor.user_id),
            Some(json!({ "reason": reason })),
        )
        .await?;
        projection_service::project(&mut tx, &interview, projection).await?;
        if action == InterviewAction::Reject {
            self.notify(&mut tx, NotificationEvent::Rejected, &interview).await?;
        }
        self.queue_delete(&mut tx, id).await?;

        let detail = self.load_detail(&mut tx, interview).await?;
        tx.commit().await?;
        info!(interview_id = %id, status = %detail.interview.status, "interview closed");
        Ok(detail)
    }

    pub async fn soft_delete(&self, actor: &Actor, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let interview = self.lock_for(&mut tx, actor, id).await?;
        interview_repo::soft_delete(&mut tx, id, actor.user_id).await?;
        self.record(
            &mut tx,
            id,
            history_service::INTERVIEW_DELETED,
            Some((interview.status, interview.status)),
            Some(actor.user_id),
            None,
        )
        .await?;
        tx.commit().await?;
        info!(interview_id = %id, "interview deleted");
        Ok(())
    }

    /// Applies a provider-side deletion of the linked event. The reason stays
    /// empty and the link is always removed.
    pub async fn cancel_from_provider(&self, conn: &mut PgConnection, link: &CalendarLink) -> Result<bool> {
        let interview = match interview_repo::lock(conn, link.interview_id).await {
            Ok(interview) => interview,
            Err(Error::NotFound(_)) => {
                calendar_link_service::delete(conn, link.interview_id).await?;
                return Ok(false);
            }
            Err(err) => return Err(err),
        };
        if let Some(latest) = superseded_by(conn, &interview).await? {
            debug!(interview_id = %interview.id, revision = interview.revision, latest, "calendar deletion on a superseded revision");
            calendar_link_service::delete(conn, link.interview_id).await?;
            return Ok(false);
        }

        let applied = match interview_state::transition(interview.status, InterviewAction::ExternalDelete)? {
            Transition::Unchanged(status) => {
                debug!(interview_id = %interview.id, %status, "calendar deletion on a closed interview");
                false
            }
            Transition::Moved { from, to } => {
                let interview = interview_repo::close(conn, interview.id, to, None, link.owning_user_id).await?;
                slot_ledger::mark_all(conn, interview.id, SlotStatus::Cancelled).await?;
                self.record(
                    conn,
                    interview.id,
                    history_service::CALENDAR_DELETED,
                    Some((from, to)),
                    None,
                    Some(json!({ "event_id": link.external_event_id })),
                )
                .await?;
                projection_service::project(conn, &interview, Projection::Cancelled).await?;
                true
            }
        };
        calendar_link_service::delete(conn, link.interview_id).await?;
        Ok(applied)
    }

    /// Makes the provider event authoritative: all slots are replaced by the
    /// event's window and the interview goes back to pending acceptance.
    pub async fn apply_provider_update(
        &self,
        conn: &mut PgConnection,
        link: &CalendarLink,
        event: &ProviderEvent,
    ) -> Result<ProviderUpdate> {
        let interview = match interview_repo::lock(conn, link.interview_id).await {
            Ok(interview) => interview,
            Err(Error::NotFound(_)) => {
                return Ok(ProviderUpdate::Ignored("interview no longer exists".to_string()))
            }
            Err(err) => return Err(err),
        };
        if let Some(latest) = superseded_by(conn, &interview).await? {
            calendar_link_service::delete(conn, link.interview_id).await?;
            return Ok(ProviderUpdate::Ignored(format!(
                "revision {} is superseded by revision {}",
                interview.revision, latest
            )));
        }
        let Some(slot) = slot_from_window(event.start, event.end) else {
            warn!(
                interview_id = %interview.id,
                event_id = %event.id,
                start = %event.start,
                end = %event.end,
                "calendar event does not fit a single-day slot"
            );
            return Ok(ProviderUpdate::Ignored("event does not fit a single-day slot".to_string()));
        };

        let slots = slot_ledger::list(conn, interview.id).await?;
        if is_echo(&interview, &slots, event) {
            return Ok(ProviderUpdate::Unchanged);
        }
        let transition = interview_state::transition(interview.status, InterviewAction::ExternalUpdate)?;
        let cleared_feedback = if transition.source() == InterviewStatus::Completed {
            interview_repo::delete_feedback(conn, interview.id).await?
        } else {
            None
        };

        slot_ledger::replace(conn, interview.id, std::slice::from_ref(&slot)).await?;
        let interview = interview_repo::reopen(
            conn,
            interview.id,
            DetailsUpdate {
                title: None,
                location: None,
                time_zone: None,
                notes: None,
                calendar_sync: None,
            },
            link.owning_user_id,
        )
        .await?;
        self.record(
            conn,
            interview.id,
            history_service::CALENDAR_UPDATED,
            Some((transition.source(), interview.status)),
            None,
            Some(json!({
                "event_id": event.id,
                "interview_date": slot.interview_date,
                "start_time": slot.start_time,
                "end_time": slot.end_time,
                "cleared_feedback": cleared_feedback,
            })),
        )
        .await?;
        projection_service::project(conn, &interview, Projection::Rescheduled).await?;
        self.notify(conn, NotificationEvent::Rescheduled, &interview).await?;
        Ok(ProviderUpdate::Applied)
    }
}
