use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::Result;
use crate::models::calendar::{CalendarCredential, CalendarLink};

const LINK_COLUMNS: &str = "interview_id, external_event_id, encrypted_refresh_token, owning_user_id, created_at";

pub async fn find_by_interview(conn: &mut PgConnection, interview_id: Uuid) -> Result<Option<CalendarLink>> {
    let link = sqlx::query_as::<_, CalendarLink>(&format!(
        "SELECT {LINK_COLUMNS} FROM calendar_links WHERE interview_id = $1"
    ))
    .bind(interview_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(link)
}

pub async fn find_by_event(conn: &mut PgConnection, event_id: &str) -> Result<Option<CalendarLink>> {
    let link = sqlx::query_as::<_, CalendarLink>(&format!(
        "SELECT {LINK_COLUMNS} FROM calendar_links WHERE external_event_id = $1"
    ))
    .bind(event_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(link)
}

pub async fn insert(
    conn: &mut PgConnection,
    interview_id: Uuid,
    event_id: &str,
    encrypted_refresh_token: &str,
    owning_user_id: Uuid,
) -> Result<CalendarLink> {
    let link = sqlx::query_as::<_, CalendarLink>(&format!(
        r#"
        INSERT INTO calendar_links (interview_id, external_event_id, encrypted_refresh_token, owning_user_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (interview_id) DO UPDATE
            SET external_event_id = EXCLUDED.external_event_id,
                encrypted_refresh_token = EXCLUDED.encrypted_refresh_token,
                owning_user_id = EXCLUDED.owning_user_id
        RETURNING {LINK_COLUMNS}
        "#
    ))
    .bind(interview_id)
    .bind(event_id)
    .bind(encrypted_refresh_token)
    .bind(owning_user_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(link)
}

pub async fn delete(conn: &mut PgConnection, interview_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM calendar_links WHERE interview_id = $1")
        .bind(interview_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Removes the link only if it still points at `event_id`; a re-created
/// event for the same interview is left alone.
pub async fn delete_event_link(conn: &mut PgConnection, interview_id: Uuid, event_id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM calendar_links WHERE interview_id = $1 AND external_event_id = $2")
        .bind(interview_id)
        .bind(event_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn credential(conn: &mut PgConnection, user_id: Uuid) -> Result<Option<CalendarCredential>> {
    let row = sqlx::query_as::<_, CalendarCredential>(
        "SELECT user_id, encrypted_refresh_token, external_user_id, updated_at FROM calendar_credentials WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

pub async fn upsert_credential(
    conn: &mut PgConnection,
    user_id: Uuid,
    encrypted_refresh_token: &str,
    external_user_id: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO calendar_credentials (user_id, encrypted_refresh_token, external_user_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id) DO UPDATE
            SET encrypted_refresh_token = EXCLUDED.encrypted_refresh_token,
                external_user_id = COALESCE(EXCLUDED.external_user_id, calendar_credentials.external_user_id),
                updated_at = NOW()
        "#,
    )
    .bind(user_id)
    .bind(encrypted_refresh_token)
    .bind(external_user_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Persists a refresh token the provider rotated during a refresh grant, on
/// the owner's credential and every link minted from it.
pub async fn store_rotated_token(
    conn: &mut PgConnection,
    user_id: Uuid,
    encrypted_refresh_token: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE calendar_credentials SET encrypted_refresh_token = $1, updated_at = NOW() WHERE user_id = $2",
    )
    .bind(encrypted_refresh_token)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;
    sqlx::query("UPDATE calendar_links SET encrypted_refresh_token = $1 WHERE owning_user_id = $2")
        .bind(encrypted_refresh_token)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
