//! Provider change subscriptions: created when a user connects a calendar
//! and renewed by a cron job before they lapse.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::CalendarConfig;
use crate::error::{Error, Result};
use crate::models::calendar::Subscription;
use crate::services::calendar_link_service;
use crate::services::calendar_provider::{CalendarError, SubscriptionRequest};
use crate::services::calendar_service::CalendarAdapter;

pub const SUBSCRIPTION_RESOURCE: &str = "me/events";
const SUBSCRIPTION_LIFETIME_DAYS: i64 = 6;
const RENEWAL_WINDOW_HOURS: i64 = 24;

const SUBSCRIPTION_COLUMNS: &str = "subscription_id, owning_user_id, resource, expiration, created_at, updated_at";

pub fn next_expiration(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(SUBSCRIPTION_LIFETIME_DAYS)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenewalSummary {
    pub renewed: usize,
    pub dropped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct SubscriptionService {
    pool: PgPool,
    adapter: CalendarAdapter,
    notification_url: String,
    client_state: Option<String>,
}

impl SubscriptionService {
    pub fn new(pool: PgPool, adapter: CalendarAdapter, config: &CalendarConfig) -> Self {
        Self {
            pool,
            adapter,
            notification_url: config.notification_url.clone(),
            client_state: config.client_state.clone(),
        }
    }

    /// Subscribes to the owner's event changes with a fresh access token
    /// obtained during the authorization callback.
    pub async fn create(&self, owner_id: Uuid, access_token: &str) -> Result<Subscription> {
        let request = SubscriptionRequest {
            notification_url: self.notification_url.clone(),
            resource: SUBSCRIPTION_RESOURCE.to_string(),
            expiration: next_expiration(Utc::now()),
            client_state: self.client_state.clone(),
        };
        let created = self.adapter.create_subscription(access_token, &request).await?;

        let row = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            INSERT INTO calendar_subscriptions (subscription_id, owning_user_id, resource, expiration)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (subscription_id) DO UPDATE
                SET expiration = EXCLUDED.expiration, updated_at = NOW()
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(&created.id)
        .bind(owner_id)
        .bind(&created.resource)
        .bind(created.expiration)
        .fetch_one(&self.pool)
        .await?;
        info!(subscription_id = %row.subscription_id, user_id = %owner_id, expiration = %row.expiration, "calendar subscription created");
        Ok(row)
    }

    pub async fn expiring(&self, before: DateTime<Utc>) -> Result<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM calendar_subscriptions WHERE expiration < $1 ORDER BY expiration"
        ))
        .bind(before)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn drop_subscription(&self, subscription_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM calendar_subscriptions WHERE subscription_id = $1")
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn renew(&self, subscription: &Subscription) -> Result<DateTime<Utc>> {
        let mut conn = self.pool.acquire().await?;
        let credential = calendar_link_service::credential(&mut conn, subscription.owning_user_id)
            .await?
            .ok_or(CalendarError::MissingCredential(subscription.owning_user_id))?;

        let renewed = self
            .adapter
            .renew_subscription(
                &credential.encrypted_refresh_token,
                &subscription.subscription_id,
                next_expiration(Utc::now()),
            )
            .await?;
        if let Some(rotated) = &renewed.rotated_refresh_token {
            calendar_link_service::store_rotated_token(&mut conn, subscription.owning_user_id, rotated).await?;
        }
        sqlx::query("UPDATE calendar_subscriptions SET expiration = $1, updated_at = NOW() WHERE subscription_id = $2")
            .bind(renewed.value)
            .bind(&subscription.subscription_id)
            .execute(&mut *conn)
            .await?;
        Ok(renewed.value)
    }

    /// Renews every subscription lapsing within the renewal window. Failures
    /// are logged per subscription; a subscription the provider no longer
    /// knows is forgotten.
    pub async fn renew_expiring(&self) -> Result<RenewalSummary> {
        let due = self
            .expiring(Utc::now() + Duration::hours(RENEWAL_WINDOW_HOURS))
            .await?;
        let mut summary = RenewalSummary::default();

        for subscription in &due {
            match self.renew(subscription).await {
                Ok(expiration) => {
                    debug!(subscription_id = %subscription.subscription_id, %expiration, "calendar subscription renewed");
                    summary.renewed += 1;
                }
                Err(Error::Calendar(err)) if err.is_not_found() => {
                    warn!(subscription_id = %subscription.subscription_id, "provider no longer knows subscription; dropping it");
                    self.drop_subscription(&subscription.subscription_id).await?;
                    summary.dropped += 1;
                }
                Err(err) => {
                    warn!(
                        subscription_id = %subscription.subscription_id,
                        user_id = %subscription.owning_user_id,
                        error = %err,
                        "calendar subscription renewal failed"
                    );
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Registers the renewal job and starts the scheduler. The scheduler is
    /// shut down when `shutdown` is cancelled.
    pub async fn start_renewal(self, cron: &str, shutdown: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new()
            .await
            .map_err(|e| Error::Internal(format!("failed to create scheduler: {}", e)))?;

        let service = self;
        let job = Job::new_async(cron, move |_id, _lock| {
            let service = service.clone();
            Box::pin(async move {
                match service.renew_expiring().await {
                    Ok(summary) if summary.renewed + summary.dropped + summary.failed > 0 => info!(
                        renewed = summary.renewed,
                        dropped = summary.dropped,
                        failed = summary.failed,
                        "calendar subscription renewal finished"
                    ),
                    Ok(_) => debug!("no calendar subscriptions due for renewal"),
                    Err(e) => error!(error = ?e, "calendar subscription renewal failed"),
                }
            })
        })
        .map_err(|e| Error::Config(format!("invalid CALENDAR_SUBSCRIPTION_RENEW_CRON '{}': {}", cron, e)))?;

        scheduler
            .add(job)
            .await
            .map_err(|e| Error::Internal(format!("failed to register renewal job: {}", e)))?;
        scheduler
            .start()
            .await
            .map_err(|e| Error::Internal(format!("failed to start scheduler: {}", e)))?;
        info!(cron, "calendar subscription renewal scheduled");

        tokio::spawn(async move {
            shutdown.cancelled().await;
            if let Err(e) = scheduler.shutdown().await {
                warn!(error = %e, "scheduler shutdown failed");
            }
        });
        Ok(())
    }
}
