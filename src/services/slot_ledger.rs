use std::collections::HashSet;

use chrono::Utc;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::slot::{NewSlot, Slot, SlotStatus};

const SLOT_COLUMNS: &str = "id, interview_id, interview_date, start_time, end_time, duration, status, is_proposed, accepted_at, created_at";

pub fn validate_new_slots(slots: &[NewSlot]) -> Result<()> {
    if slots.is_empty() {
        return Err(Error::BadRequest("At least one interview slot is required".into()));
    }
    for slot in slots {
        if slot.end_time <= slot.start_time {
            return Err(Error::BadRequest(format!(
                "Slot on {} must end after it starts ({} - {})",
                slot.interview_date, slot.start_time, slot.end_time
            )));
        }
    }
    let mut seen = HashSet::new();
    for slot in slots {
        if !seen.insert((slot.interview_date, slot.start_time, slot.end_time)) {
            return Err(Error::BadRequest(format!(
                "Duplicate slot on {} at {}",
                slot.interview_date, slot.start_time
            )));
        }
    }
    Ok(())
}

/// Status updates for an accept: the named slots become `ACCEPTED`, every
/// other slot of the interview becomes `DECLINED`.
pub fn plan_accept(slots: &[Slot], accepted_ids: &[Uuid]) -> Result<Vec<(Uuid, SlotStatus)>> {
    if accepted_ids.is_empty() {
        return Err(Error::BadRequest("Select at least one slot to accept".into()));
    }
    let wanted: HashSet<Uuid> = accepted_ids.iter().copied().collect();
    for id in &wanted {
        let Some(slot) = slots.iter().find(|s| s.id == *id) else {
            return Err(Error::BadRequest(format!(
                "Slot {} does not belong to this interview",
                id
            )));
        };
        if slot.status != SlotStatus::Pending {
            return Err(Error::Conflict(format!(
                "Slot {} is no longer open for acceptance",
                id
            )));
        }
    }

    Ok(slots
        .iter()
        .map(|slot| {
            let status = if wanted.contains(&slot.id) {
                SlotStatus::Accepted
            } else {
                SlotStatus::Declined
            };
            (slot.id, status)
        })
        .collect())
}

/// Slots superseded by a new proposal round: every original (non-proposed)
/// slot, plus earlier proposals nobody acted on.
pub fn plan_proposal(slots: &[Slot]) -> Vec<Uuid> {
    slots
        .iter()
        .filter(|s| !s.is_proposed || s.status == SlotStatus::Pending)
        .filter(|s| s.status != SlotStatus::Rejected)
        .map(|s| s.id)
        .collect()
}

/// The slot a calendar event is built from. Only one slot is ever mirrored to
/// the provider; it is the earliest slot still in play.
pub fn primary_slot(slots: &[Slot]) -> Option<&Slot> {
    let live = |s: &&Slot| matches!(s.status, SlotStatus::Pending | SlotStatus::Accepted);
    let accepted = slots
        .iter()
        .filter(|s| s.status == SlotStatus::Accepted)
        .min_by_key(|s| (s.interview_date, s.start_time));
    accepted.or_else(|| {
        slots
            .iter()
            .filter(live)
            .min_by_key(|s| (s.interview_date, s.start_time))
    })
}

pub async fn list(conn: &mut PgConnection, interview_id: Uuid) -> Result<Vec<Slot>> {
    let slots = sqlx::query_as::<_, Slot>(&format!(
        "SELECT {SLOT_COLUMNS} FROM interview_slots WHERE interview_id = $1 ORDER BY interview_date, start_time, created_at"
    ))
    .bind(interview_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(slots)
}

pub async fn insert(
    conn: &mut PgConnection,
    interview_id: Uuid,
    slots: &[NewSlot],
    is_proposed: bool,
) -> Result<Vec<Slot>> {
    let mut inserted = Vec::with_capacity(slots.len());
    for slot in slots {
        let row = sqlx::query_as::<_, Slot>(&format!(
            r#"
            INSERT INTO interview_slots (interview_id, interview_date, start_time, end_time, duration, status, is_proposed)
            VALUES ($1, $2, $3, $4, $5, 'PENDING', $6)
            RETURNING {SLOT_COLUMNS}
            "#
        ))
        .bind(interview_id)
        .bind(slot.interview_date)
        .bind(slot.start_time)
        .bind(slot.end_time)
        .bind(slot.duration_minutes())
        .bind(is_proposed)
        .fetch_one(&mut *conn)
        .await?;
        inserted.push(row);
    }
    Ok(inserted)
}

pub async fn apply_statuses(conn: &mut PgConnection, updates: &[(Uuid, SlotStatus)]) -> Result<()> {
    let now = Utc::now();
    for (id, status) in updates {
        sqlx::query(
            r#"
            UPDATE interview_slots
            SET status = $1,
                accepted_at = CASE WHEN $1 = 'ACCEPTED'::slot_status THEN $2 ELSE accepted_at END
            WHERE id = $3
            "#,
        )
        .bind(status)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn mark(conn: &mut PgConnection, ids: &[Uuid], status: SlotStatus) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query("UPDATE interview_slots SET status = $1 WHERE id = ANY($2)")
        .bind(status)
        .bind(ids)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn mark_all(conn: &mut PgConnection, interview_id: Uuid, status: SlotStatus) -> Result<u64> {
    let result = sqlx::query("UPDATE interview_slots SET status = $1 WHERE interview_id = $2")
        .bind(status)
        .bind(interview_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Destructive replacement used by reschedule and calendar reconciliation.
pub async fn replace(
    conn: &mut PgConnection,
    interview_id: Uuid,
    slots: &[NewSlot],
) -> Result<Vec<Slot>> {
    sqlx::query(
        "UPDATE interview_attendees SET accepted_schedule_id = NULL, status = 'pending', updated_at = NOW() WHERE interview_id = $1",
    )
    .bind(interview_id)
    .execute(&mut *conn)
    .await?;
    sqlx::query("DELETE FROM interview_slots WHERE interview_id = $1")
        .bind(interview_id)
        .execute(&mut *conn)
        .await?;
    insert(conn, interview_id, slots, false).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 11, d).unwrap()
    }

    fn slot(day: u32, hour: u32, status: SlotStatus, is_proposed: bool) -> Slot {
        Slot {
            id: Uuid::new_v4(),
            interview_id: Uuid::nil(),
            interview_date: date(day),
            start_time: time(hour, 0),
            end_time: time(hour + 1, 0),
            duration: 60,
            status,
            is_proposed,
            accepted_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn accepting_a_declines_b() {
        let a = slot(2, 9, SlotStatus::Pending, false);
        let b = slot(3, 14, SlotStatus::Pending, false);
        let plan = plan_accept(&[a.clone(), b.clone()], &[a.id]).unwrap();

        assert_eq!(plan, vec![(a.id, SlotStatus::Accepted), (b.id, SlotStatus::Declined)]);
    }

    #[test]
    fn every_unnamed_slot_is_declined() {
        let slots = vec![
            slot(2, 9, SlotStatus::Pending, true),
            slot(2, 11, SlotStatus::Pending, true),
            slot(1, 9, SlotStatus::Rejected, false),
        ];
        let plan = plan_accept(&slots, &[slots[0].id, slots[1].id]).unwrap();

        let accepted: Vec<_> = plan.iter().filter(|(_, s)| *s == SlotStatus::Accepted).collect();
        assert_eq!(accepted.len(), 2);
        assert_eq!(plan[2], (slots[2].id, SlotStatus::Declined));
    }

    #[test]
    fn accept_rejects_foreign_and_closed_slots() {
        let a = slot(2, 9, SlotStatus::Pending, false);
        let closed = slot(2, 10, SlotStatus::Rejected, false);

        assert!(matches!(
            plan_accept(&[a.clone()], &[Uuid::new_v4()]),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            plan_accept(&[a.clone(), closed.clone()], &[closed.id]),
            Err(Error::Conflict(_))
        ));
        assert!(matches!(plan_accept(&[a], &[]), Err(Error::BadRequest(_))));
    }

    #[test]
    fn new_round_rejects_original_and_stale_proposals() {
        let original = slot(2, 9, SlotStatus::Pending, false);
        let declined_original = slot(2, 10, SlotStatus::Declined, false);
        let stale_proposal = slot(3, 9, SlotStatus::Pending, true);
        let already_rejected = slot(1, 9, SlotStatus::Rejected, false);

        let superseded = plan_proposal(&[
            original.clone(),
            declined_original.clone(),
            stale_proposal.clone(),
            already_rejected,
        ]);

        assert_eq!(
            superseded,
            vec![original.id, declined_original.id, stale_proposal.id]
        );
    }

    #[test]
    fn validation_catches_inverted_and_duplicate_windows() {
        let ok = NewSlot {
            interview_date: date(4),
            start_time: time(10, 0),
            end_time: time(10, 45),
        };
        assert_eq!(ok.duration_minutes(), 45);
        assert!(validate_new_slots(&[ok.clone()]).is_ok());
        assert!(validate_new_slots(&[]).is_err());
        assert!(validate_new_slots(&[ok.clone(), ok.clone()]).is_err());

        let inverted = NewSlot {
            interview_date: date(4),
            start_time: time(11, 0),
            end_time: time(10, 0),
        };
        assert!(validate_new_slots(&[inverted]).is_err());
    }

    #[test]
    fn primary_slot_prefers_accepted_then_earliest_live() {
        let late = slot(5, 9, SlotStatus::Pending, false);
        let early = slot(3, 9, SlotStatus::Pending, false);
        let dead = slot(1, 9, SlotStatus::Rejected, false);
        let slots = vec![late.clone(), early.clone(), dead];
        assert_eq!(primary_slot(&slots).unwrap().id, early.id);

        let accepted = slot(6, 9, SlotStatus::Accepted, true);
        let slots = vec![late, early, accepted.clone()];
        assert_eq!(primary_slot(&slots).unwrap().id, accepted.id);

        assert!(primary_slot(&[]).is_none());
    }
}
