use std::collections::HashMap;

use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::user::User;

pub async fn find(conn: &mut PgConnection, id: Uuid) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, name, email, role, vendor_id, is_active, created_at, updated_at FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(user)
}

pub async fn require_active(conn: &mut PgConnection, id: Uuid) -> Result<User> {
    match find(conn, id).await? {
        Some(user) if user.is_active => Ok(user),
        Some(_) => Err(Error::Precondition(format!("User {} is inactive", id))),
        None => Err(Error::Precondition(format!("User {} not found", id))),
    }
}

/// Name and email per user id, for rendering internal attendees.
pub async fn contacts(conn: &mut PgConnection, ids: &[Uuid]) -> Result<HashMap<Uuid, (String, String)>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(Uuid, String, String)> =
        sqlx::query_as("SELECT id, name, email FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&mut *conn)
            .await?;
    Ok(rows
        .into_iter()
        .map(|(id, name, email)| (id, (name, email)))
        .collect())
}
