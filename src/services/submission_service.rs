use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::submission::SubmissionCandidate;

const SUBMISSION_COLUMNS: &str = "id, program_id, job_id, candidate_id, vendor_id, candidate_name, status, created_at, updated_at";

pub async fn find_for_lineage(
    conn: &mut PgConnection,
    job_id: Uuid,
    candidate_id: Uuid,
) -> Result<Option<SubmissionCandidate>> {
    let row = sqlx::query_as::<_, SubmissionCandidate>(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM submission_candidates WHERE job_id = $1 AND candidate_id = $2"
    ))
    .bind(job_id)
    .bind(candidate_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<SubmissionCandidate> {
    sqlx::query_as::<_, SubmissionCandidate>(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM submission_candidates WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::Precondition(format!("Submission {} not found", id)))
}

pub async fn update_status(conn: &mut PgConnection, id: Uuid, status: &str) -> Result<()> {
    sqlx::query("UPDATE submission_candidates SET status = $1, updated_at = NOW() WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
