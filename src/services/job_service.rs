use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::job::Job;

pub async fn find(conn: &mut PgConnection, id: Uuid) -> Result<Option<Job>> {
    let job = sqlx::query_as::<_, Job>("SELECT id, program_id, title, status FROM jobs WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(job)
}

/// Gate for every interview write that touches scheduling data.
pub async fn ensure_schedulable(conn: &mut PgConnection, id: Uuid) -> Result<Job> {
    let job = find(conn, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Job {} not found", id)))?;
    if job.is_on_hold() {
        return Err(Error::Precondition(format!(
            "Job {} is in status {} and cannot schedule interviews",
            job.id, job.status
        )));
    }
    Ok(job)
}
