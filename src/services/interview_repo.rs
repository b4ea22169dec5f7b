use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::interview::{CustomField, Feedback, Interview, InterviewStatus, SiblingRevision};

pub const INTERVIEW_COLUMNS: &str = "id, program_id, job_id, candidate_id, vendor_id, submission_id, status, revision, title, location, time_zone, cancel_reason, notes, calendar_sync, is_deleted, created_by, updated_by, created_at, updated_at";

pub struct NewInterview<'a> {
    pub program_id: Uuid,
    pub job_id: Uuid,
    pub candidate_id: Uuid,
    pub vendor_id: Uuid,
    pub submission_id: Uuid,
    pub status: InterviewStatus,
    pub revision: i32,
    pub title: &'a str,
    pub location: Option<&'a str>,
    pub time_zone: &'a str,
    pub notes: Option<&'a str>,
    pub calendar_sync: bool,
    pub created_by: Uuid,
}

pub async fn get(conn: &mut PgConnection, id: Uuid) -> Result<Interview> {
    sqlx::query_as::<_, Interview>(&format!(
        "SELECT {INTERVIEW_COLUMNS} FROM interviews WHERE id = $1 AND NOT is_deleted"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Interview {} not found", id)))
}

/// Row lock held until the surrounding transaction ends; serialises
/// concurrent mutations of the same interview.
pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Interview> {
    sqlx::query_as::<_, Interview>(&format!(
        "SELECT {INTERVIEW_COLUMNS} FROM interviews WHERE id = $1 AND NOT is_deleted FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Interview {} not found", id)))
}

/// Serialises revision creation for one `(job_id, candidate_id)` lineage.
pub async fn lock_lineage(conn: &mut PgConnection, job_id: Uuid, candidate_id: Uuid) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1)::bigint)")
        .bind(format!("interview-lineage:{}:{}", job_id, candidate_id))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn lineage(
    conn: &mut PgConnection,
    job_id: Uuid,
    candidate_id: Uuid,
) -> Result<Vec<Interview>> {
    let rows = sqlx::query_as::<_, Interview>(&format!(
        r#"
        SELECT {INTERVIEW_COLUMNS} FROM interviews
        WHERE job_id = $1 AND candidate_id = $2 AND NOT is_deleted
        ORDER BY revision
        "#
    ))
    .bind(job_id)
    .bind(candidate_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// Highest revision ever issued for the lineage, soft-deleted rows included,
/// so revision numbers are never reused.
pub async fn max_revision(conn: &mut PgConnection, job_id: Uuid, candidate_id: Uuid) -> Result<i32> {
    let max: Option<i32> = sqlx::query_scalar(
        "SELECT MAX(revision) FROM interviews WHERE job_id = $1 AND candidate_id = $2",
    )
    .bind(job_id)
    .bind(candidate_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(max.unwrap_or(0))
}

/// Highest live revision of the lineage. Older revisions are history and
/// stay read-only.
pub async fn latest_revision(conn: &mut PgConnection, job_id: Uuid, candidate_id: Uuid) -> Result<i32> {
    let max: Option<i32> = sqlx::query_scalar(
        "SELECT MAX(revision) FROM interviews WHERE job_id = $1 AND candidate_id = $2 AND NOT is_deleted",
    )
    .bind(job_id)
    .bind(candidate_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(max.unwrap_or(0))
}

pub async fn siblings(conn: &mut PgConnection, interview: &Interview) -> Result<Vec<SiblingRevision>> {
    let rows = sqlx::query_as::<_, SiblingRevision>(
        r#"
        SELECT id, revision, status FROM interviews
        WHERE job_id = $1 AND candidate_id = $2 AND id <> $3 AND NOT is_deleted
        ORDER BY revision
        "#,
    )
    .bind(interview.job_id)
    .bind(interview.candidate_id)
    .bind(interview.id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn insert(conn: &mut PgConnection, new: NewInterview<'_>) -> Result<Interview> {
    let row = sqlx::query_as::<_, Interview>(&format!(
        r#"
        INSERT INTO interviews (
            program_id, job_id, candidate_id, vendor_id, submission_id, status, revision,
            title, location, time_zone, notes, calendar_sync, created_by, updated_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
        RETURNING {INTERVIEW_COLUMNS}
        "#
    ))
    .bind(new.program_id)
    .bind(new.job_id)
    .bind(new.candidate_id)
    .bind(new.vendor_id)
    .bind(new.submission_id)
    .bind(new.status)
    .bind(new.revision)
    .bind(new.title)
    .bind(new.location)
    .bind(new.time_zone)
    .bind(new.notes)
    .bind(new.calendar_sync)
    .bind(new.created_by)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

pub async fn set_status(
    conn: &mut PgConnection,
    id: Uuid,
    status: InterviewStatus,
    updated_by: Uuid,
) -> Result<Interview> {
    let row = sqlx::query_as::<_, Interview>(&format!(
        r#"
        UPDATE interviews SET status = $1, updated_by = $2, updated_at = NOW()
        WHERE id = $3
        RETURNING {INTERVIEW_COLUMNS}
        "#
    ))
    .bind(status)
    .bind(updated_by)
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

pub async fn close(
    conn: &mut PgConnection,
    id: Uuid,
    status: InterviewStatus,
    reason: Option<&str>,
    updated_by: Uuid,
) -> Result<Interview> {
    let row = sqlx::query_as::<_, Interview>(&format!(
        r#"
        UPDATE interviews SET status = $1, cancel_reason = $2, updated_by = $3, updated_at = NOW()
        WHERE id = $4
        RETURNING {INTERVIEW_COLUMNS}
        "#
    ))
    .bind(status)
    .bind(reason)
    .bind(updated_by)
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

pub async fn append_notes(conn: &mut PgConnection, id: Uuid, notes: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE interviews
        SET notes = CASE WHEN notes IS NULL OR notes = '' THEN $1 ELSE notes || E'\n' || $1 END
        WHERE id = $2
        "#,
    )
    .bind(notes)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub struct DetailsUpdate<'a> {
    pub title: Option<&'a str>,
    pub location: Option<&'a str>,
    pub time_zone: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub calendar_sync: Option<bool>,
}

pub async fn reopen(
    conn: &mut PgConnection,
    id: Uuid,
    details: DetailsUpdate<'_>,
    updated_by: Uuid,
) -> Result<Interview> {
    let row = sqlx::query_as::<_, Interview>(&format!(
        r#"
        UPDATE interviews SET
            status = 'PENDING_ACCEPTANCE',
            cancel_reason = NULL,
            title = COALESCE($1, title),
            location = COALESCE($2, location),
            time_zone = COALESCE($3, time_zone),
            notes = COALESCE($4, notes),
            calendar_sync = COALESCE($5, calendar_sync),
            updated_by = $6,
            updated_at = NOW()
        WHERE id = $7
        RETURNING {INTERVIEW_COLUMNS}
        "#
    ))
    .bind(details.title)
    .bind(details.location)
    .bind(details.time_zone)
    .bind(details.notes)
    .bind(details.calendar_sync)
    .bind(updated_by)
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

pub async fn soft_delete(conn: &mut PgConnection, id: Uuid, updated_by: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE interviews SET is_deleted = TRUE, updated_by = $1, updated_at = NOW() WHERE id = $2 AND NOT is_deleted",
    )
    .bind(updated_by)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn custom_fields(conn: &mut PgConnection, interview_id: Uuid) -> Result<Vec<CustomField>> {
    let rows = sqlx::query_as::<_, CustomField>(
        "SELECT id, interview_id, field_key, value FROM interview_custom_fields WHERE interview_id = $1 ORDER BY field_key",
    )
    .bind(interview_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn replace_custom_fields(
    conn: &mut PgConnection,
    interview_id: Uuid,
    fields: &[(String, serde_json::Value)],
) -> Result<()> {
    sqlx::query("DELETE FROM interview_custom_fields WHERE interview_id = $1")
        .bind(interview_id)
        .execute(&mut *conn)
        .await?;
    for (key, value) in fields {
        sqlx::query(
            "INSERT INTO interview_custom_fields (interview_id, field_key, value) VALUES ($1, $2, $3)",
        )
        .bind(interview_id)
        .bind(key)
        .bind(value)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn feedback(conn: &mut PgConnection, interview_id: Uuid) -> Result<Option<Feedback>> {
    let row = sqlx::query_as::<_, Feedback>(
        "SELECT id, interview_id, outcome, rating, notes, created_by, created_at FROM interview_feedback WHERE interview_id = $1",
    )
    .bind(interview_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

pub async fn insert_feedback(
    conn: &mut PgConnection,
    interview_id: Uuid,
    outcome: &str,
    rating: Option<rust_decimal::Decimal>,
    notes: Option<&str>,
    created_by: Uuid,
) -> Result<Feedback> {
    let row = sqlx::query_as::<_, Feedback>(
        r#"
        INSERT INTO interview_feedback (interview_id, outcome, rating, notes, created_by)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, interview_id, outcome, rating, notes, created_by, created_at
        "#,
    )
    .bind(interview_id)
    .bind(outcome)
    .bind(rating)
    .bind(notes)
    .bind(created_by)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

/// Drops the recorded outcome so a reopened round can be completed again.
pub async fn delete_feedback(conn: &mut PgConnection, interview_id: Uuid) -> Result<Option<Feedback>> {
    let row = sqlx::query_as::<_, Feedback>(
        r#"
        DELETE FROM interview_feedback WHERE interview_id = $1
        RETURNING id, interview_id, outcome, rating, notes, created_by, created_at
        "#,
    )
    .bind(interview_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}
