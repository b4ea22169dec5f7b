use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::calendar_dto::AvailabilityRequest,
    dto::interview_dto::{
        AcceptInterviewPayload, AcceptInterviewResponse, CompleteInterviewPayload,
        CreateInterviewPayload, LineageQuery, ProposeSlotsPayload, ReasonPayload,
        ReschedulePayload,
    },
    error::Result,
    models::user::Actor,
    services::interview_service::AcceptOutcome,
    AppState,
};

#[axum::debug_handler]
pub async fn create_interview(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<CreateInterviewPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let detail = state.interview_service.create(&actor, payload).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

#[axum::debug_handler]
pub async fn list_lineage(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<LineageQuery>,
) -> Result<impl IntoResponse> {
    let interviews = state
        .interview_service
        .lineage(&actor, query.job_id, query.candidate_id)
        .await?;
    Ok(Json(interviews))
}

#[axum::debug_handler]
pub async fn get_interview(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.interview_service.detail(&actor, id).await?))
}

#[axum::debug_handler]
pub async fn get_history(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.interview_service.history(&actor, id).await?))
}

#[axum::debug_handler]
pub async fn publish_interview(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.interview_service.publish(&actor, id).await?))
}

#[axum::debug_handler]
pub async fn accept_interview(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptInterviewPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let response = match state.interview_service.accept(&actor, id, payload).await? {
        AcceptOutcome::Accepted(detail) => AcceptInterviewResponse {
            already_accepted: false,
            detail,
        },
        AcceptOutcome::AlreadyAccepted(detail) => AcceptInterviewResponse {
            already_accepted: true,
            detail,
        },
    };
    Ok(Json(response))
}

#[axum::debug_handler]
pub async fn propose_slots(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProposeSlotsPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    Ok(Json(state.interview_service.propose(&actor, id, payload).await?))
}

#[axum::debug_handler]
pub async fn reschedule_interview(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReschedulePayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    Ok(Json(state.interview_service.reschedule(&actor, id, payload).await?))
}

#[axum::debug_handler]
pub async fn complete_interview(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompleteInterviewPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    Ok(Json(state.interview_service.complete(&actor, id, payload).await?))
}

#[axum::debug_handler]
pub async fn cancel_interview(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReasonPayload>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.interview_service.cancel(&actor, id, payload).await?))
}

#[axum::debug_handler]
pub async fn reject_interview(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReasonPayload>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.interview_service.reject(&actor, id, payload).await?))
}

#[axum::debug_handler]
pub async fn delete_interview(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.interview_service.soft_delete(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn check_availability(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<AvailabilityRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    Ok(Json(state.availability_service.check(&actor, payload).await?))
}
