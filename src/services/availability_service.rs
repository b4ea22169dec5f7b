use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::dto::calendar_dto::{AvailabilityRequest, AvailabilityResponse, ParticipantAvailability};
use crate::error::{Error, Result};
use crate::models::user::Actor;
use crate::services::calendar_link_service;
use crate::services::calendar_service::{Availability, CalendarAdapter};
use crate::utils::time::overlaps;

/// A slot some participant has accepted.
#[derive(Debug, Clone, FromRow)]
pub struct Commitment {
    pub participant_id: Uuid,
    pub interview_id: Uuid,
    pub interview_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// One entry per requested participant, in request order.
pub fn local_availability(
    participant_ids: &[Uuid],
    commitments: &[Commitment],
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Vec<ParticipantAvailability> {
    participant_ids
        .iter()
        .map(|&participant_id| {
            let mut conflicting_interviews: Vec<Uuid> = commitments
                .iter()
                .filter(|c| c.participant_id == participant_id)
                .filter(|c| {
                    overlaps(
                        c.interview_date.and_time(c.start_time),
                        c.interview_date.and_time(c.end_time),
                        start,
                        end,
                    )
                })
                .map(|c| c.interview_id)
                .collect();
            conflicting_interviews.dedup();
            ParticipantAvailability {
                participant_id,
                available: conflicting_interviews.is_empty(),
                conflicting_interviews,
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct AvailabilityService {
    pool: PgPool,
    adapter: Option<CalendarAdapter>,
}

impl AvailabilityService {
    pub fn new(pool: PgPool, adapter: Option<CalendarAdapter>) -> Self {
        Self { pool, adapter }
    }

    async fn commitments(
        &self,
        participant_ids: &[Uuid],
        date: NaiveDate,
        exclude_interview_id: Option<Uuid>,
    ) -> Result<Vec<Commitment>> {
        let rows = sqlx::query_as::<_, Commitment>(
            r#"
            SELECT a.participant_id, s.interview_id, s.interview_date, s.start_time, s.end_time
            FROM interview_attendees a
            JOIN interview_slots s ON s.id = a.accepted_schedule_id
            JOIN interviews i ON i.id = s.interview_id
            WHERE a.participant_id = ANY($1)
              AND s.status = 'ACCEPTED'
              AND s.interview_date = $2
              AND NOT i.is_deleted
              AND i.status NOT IN ('CANCELLED', 'REJECTED')
              AND ($3::uuid IS NULL OR s.interview_id <> $3)
            ORDER BY s.start_time
            "#,
        )
        .bind(participant_ids)
        .bind(date)
        .bind(exclude_interview_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn provider_availability(
        &self,
        actor: &Actor,
        emails: &[String],
        start: NaiveDateTime,
        end: NaiveDateTime,
        time_zone: &str,
    ) -> Result<BTreeMap<String, Availability>> {
        let Some(adapter) = &self.adapter else {
            return Err(Error::Precondition(
                "Calendar integration is not configured".to_string(),
            ));
        };
        let mut conn = self.pool.acquire().await?;
        let Some(credential) = calendar_link_service::credential(&mut conn, actor.user_id).await? else {
            return Err(Error::Precondition(
                "Connect a calendar before checking external availability".to_string(),
            ));
        };

        let result = adapter
            .free_busy(&credential.encrypted_refresh_token, emails, start, end, time_zone)
            .await?;
        if let Some(rotated) = &result.rotated_refresh_token {
            calendar_link_service::store_rotated_token(&mut conn, actor.user_id, rotated).await?;
        }
        Ok(result.value)
    }

    pub async fn check(&self, actor: &Actor, request: AvailabilityRequest) -> Result<AvailabilityResponse> {
        if request.end_time <= request.start_time {
            return Err(Error::BadRequest("Availability window must end after it starts".to_string()));
        }
        if request.participant_ids.is_empty() && request.emails.is_empty() {
            return Err(Error::BadRequest("Name at least one participant or email".to_string()));
        }
        let emails: Vec<String> = request
            .emails
            .iter()
            .map(|e| e.trim().to_ascii_lowercase())
            .collect();
        if let Some(bad) = emails.iter().find(|e| !e.contains('@')) {
            return Err(Error::BadRequest(format!("Invalid email '{}'", bad)));
        }

        let start = request.interview_date.and_time(request.start_time);
        let end = request.interview_date.and_time(request.end_time);

        let participants = if request.participant_ids.is_empty() {
            Vec::new()
        } else {
            let commitments = self
                .commitments(&request.participant_ids, request.interview_date, request.exclude_interview_id)
                .await?;
            local_availability(&request.participant_ids, &commitments, start, end)
        };

        let emails = if emails.is_empty() {
            BTreeMap::new()
        } else {
            let time_zone = request.time_zone.as_deref().unwrap_or("UTC");
            self.provider_availability(actor, &emails, start, end, time_zone)
                .await?
        };

        Ok(AvailabilityResponse { participants, emails })
    }
}
