pub mod calendar_dto;
pub mod interview_dto;
