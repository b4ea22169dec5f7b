pub mod attendee_registry;
pub mod availability_service;
pub mod calendar_link_service;
pub mod calendar_outbox_service;
pub mod calendar_provider;
pub mod calendar_service;
pub mod history_service;
pub mod interview_repo;
pub mod interview_service;
pub mod interview_state;
pub mod job_service;
pub mod notification_service;
pub mod projection_service;
pub mod reconciler_service;
pub mod slot_ledger;
pub mod submission_service;
pub mod subscription_service;
pub mod user_service;
