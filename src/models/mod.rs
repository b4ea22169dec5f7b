pub mod attendee;
pub mod calendar;
pub mod history;
pub mod interview;
pub mod job;
pub mod notification_log;
pub mod slot;
pub mod submission;
pub mod user;
