pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::services::{
    availability_service::AvailabilityService, calendar_outbox_service::CalendarOutboxService,
    calendar_service::CalendarAdapter, interview_service::InterviewService,
    notification_service::NotificationService, reconciler_service::Reconciler,
    subscription_service::SubscriptionService,
};
use sqlx::PgPool;

/// Calendar-side services; absent when no calendar client is configured.
#[derive(Clone)]
pub struct CalendarState {
    pub adapter: CalendarAdapter,
    pub reconciler: Reconciler,
    pub subscription_service: SubscriptionService,
    pub outbox_service: CalendarOutboxService,
}

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub jwt_secret: Arc<str>,
    pub interview_service: InterviewService,
    pub availability_service: AvailabilityService,
    pub notification_service: NotificationService,
    pub calendar: Option<CalendarState>,
}

impl AppState {
    pub fn new(pool: PgPool, config: &Config) -> Result<Self> {
        let interview_service = InterviewService::new(pool.clone(), config);
        let notification_service =
            NotificationService::new(pool.clone(), config.notification_webhook_secret.clone());

        let calendar = match &config.calendar {
            Some(calendar_config) => {
                let adapter = CalendarAdapter::from_config(calendar_config)?;
                Some(CalendarState {
                    reconciler: Reconciler::new(
                        pool.clone(),
                        adapter.clone(),
                        interview_service.clone(),
                        calendar_config.client_state.clone(),
                    ),
                    subscription_service: SubscriptionService::new(
                        pool.clone(),
                        adapter.clone(),
                        calendar_config,
                    ),
                    outbox_service: CalendarOutboxService::new(pool.clone(), adapter.clone()),
                    adapter,
                })
            }
            None => None,
        };
        let availability_service =
            AvailabilityService::new(pool.clone(), calendar.as_ref().map(|c| c.adapter.clone()));

        Ok(Self {
            pool,
            jwt_secret: Arc::from(config.jwt_secret.as_str()),
            interview_service,
            availability_service,
            notification_service,
            calendar,
        })
    }
}
