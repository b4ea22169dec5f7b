use crate::error::Result;
use crate::models::notification_log::NotificationLog;
use reqwest::Client;
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, PgPool, Row};
use tracing::{debug, warn};
use uuid::Uuid;

const NOTIFICATION_COLUMNS: &str = "id, event_code, payload, target_url, http_status, response_body, attempts, max_attempts, next_retry_at, status, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationEvent {
    Scheduled,
    Accepted,
    Confirmed,
    Rejected,
    Rescheduled,
}

impl NotificationEvent {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Accepted => "accepted",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
            Self::Rescheduled => "rescheduled",
        }
    }
}

/// Writes the event into the outbox on the caller's transaction. Delivery
/// happens later in [`NotificationService::run_once`]; nothing is sent when
/// no target is configured.
pub async fn enqueue(
    conn: &mut PgConnection,
    target_url: Option<&str>,
    event: NotificationEvent,
    payload: &JsonValue,
) -> Result<Option<Uuid>> {
    let Some(target_url) = target_url else {
        debug!(event = event.code(), "no notification target configured; event dropped");
        return Ok(None);
    };
    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO notification_logs (event_code, payload, target_url, status)
        VALUES ($1, $2, $3, 'pending')
        RETURNING id
        "#,
    )
    .bind(event.code())
    .bind(payload)
    .bind(target_url)
    .fetch_one(&mut *conn)
    .await?;
    Ok(Some(id))
}

#[derive(Clone)]
pub struct NotificationService {
    pool: PgPool,
    client: Client,
    secret: Option<String>,
}

impl NotificationService {
    pub fn new(pool: PgPool, secret: Option<String>) -> Self {
        Self {
            pool,
            client: Client::new(),
            secret,
        }
    }

    pub async fn deliver_once(&self, log_id: Uuid) -> Result<bool> {
        let log = sqlx::query_as::<_, NotificationLog>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notification_logs WHERE id = $1"
        ))
        .bind(log_id)
        .fetch_one(&self.pool)
        .await?;

        let mut request = self.client.post(&log.target_url).json(&serde_json::json!({
            "event": log.event_code,
            "data": log.payload,
        }));
        if let Some(secret) = &self.secret {
            request = request.header("X-Webhook-Secret", secret);
        }

        match request.send().await {
            Ok(resp) => {
                let status = resp.status().as_u16() as i32;
                let body = resp.text().await.unwrap_or_default();
                let delivered = (200..300).contains(&status);
                sqlx::query(
                    r#"UPDATE notification_logs SET http_status = $1, response_body = $2, status = CASE WHEN $3 THEN 'success' ELSE 'failed' END, attempts = attempts + 1, updated_at = NOW() WHERE id = $4"#,
                )
                .bind(status)
                .bind(body)
                .bind(delivered)
                .bind(log.id)
                .execute(&self.pool)
                .await?;
                Ok(delivered)
            }
            Err(err) => {
                warn!(notification_id = %log.id, error = %err, "notification delivery failed");
                sqlx::query(
                    r#"UPDATE notification_logs SET response_body = $1, status = 'failed', attempts = attempts + 1, updated_at = NOW() WHERE id = $2"#,
                )
                .bind(err.to_string())
                .bind(log.id)
                .execute(&self.pool)
                .await?;
                Ok(false)
            }
        }
    }

    /// Claims and delivers one due notification. Returns `false` when the
    /// queue is empty.
    pub async fn run_once(&self) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let row_opt = sqlx::query(
            r#"SELECT id FROM notification_logs
               WHERE (status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= NOW()))
                  OR (status = 'sending' AND updated_at < NOW() - interval '10 minutes')
               ORDER BY created_at ASC
               FOR UPDATE SKIP LOCKED
               LIMIT 1"#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row_opt else {
            tx.commit().await?;
            return Ok(false);
        };
        let id: Uuid = row.try_get("id")?;
        sqlx::query("UPDATE notification_logs SET status = 'sending', updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if self.deliver_once(id).await? {
            return Ok(true);
        }

        // Failed attempts go back to pending with exponential backoff until
        // max_attempts is reached; after that the row stays 'failed'.
        sqlx::query(
            r#"UPDATE notification_logs
               SET status = 'pending',
                   next_retry_at = NOW() + make_interval(secs => LEAST(3600, 30 * power(2::float, GREATEST(0, attempts - 1))::int))
               WHERE id = $1 AND status = 'failed' AND attempts < max_attempts"#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(true)
    }
}
