use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};

use crate::{
    dto::calendar_dto::{
        CallbackQuery, CallbackResponse, ConnectResponse, NotificationBatch, WebhookQuery,
    },
    error::{Error, Result},
    models::user::Actor,
    services::{calendar_link_service, user_service},
    utils::token::{issue_oauth_state, verify_oauth_state},
    AppState, CalendarState,
};

fn calendar(state: &AppState) -> Result<&CalendarState> {
    state
        .calendar
        .as_ref()
        .ok_or_else(|| Error::Precondition("Calendar integration is not configured".to_string()))
}

#[axum::debug_handler]
pub async fn connect(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<ConnectResponse>> {
    let calendar = calendar(&state)?;
    let oauth_state = issue_oauth_state(actor.user_id, &state.jwt_secret)?;
    let authorize_url = calendar.adapter.authorize_url(&oauth_state)?;
    Ok(Json(ConnectResponse { authorize_url }))
}

#[axum::debug_handler]
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<CallbackResponse>> {
    let calendar = calendar(&state)?;
    if let Some(error) = query.error {
        let message = match query.error_description {
            Some(description) => format!("Authorization was declined: {} ({})", error, description),
            None => format!("Authorization was declined: {}", error),
        };
        return Err(Error::BadRequest(message));
    }
    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return Err(Error::BadRequest("code and state are required".to_string()));
    };

    let user_id = verify_oauth_state(&oauth_state, &state.jwt_secret)?;
    {
        let mut conn = state.pool.acquire().await?;
        user_service::require_active(&mut conn, user_id).await?;
    }

    let connected = calendar.adapter.connect(&code).await?;
    {
        let mut conn = state.pool.acquire().await?;
        calendar_link_service::upsert_credential(
            &mut conn,
            user_id,
            &connected.encrypted_refresh_token,
            Some(&connected.identity.id),
        )
        .await?;
    }
    tracing::info!(%user_id, external_user_id = %connected.identity.id, "calendar connected");

    let subscription_id = match calendar
        .subscription_service
        .create(user_id, &connected.access_token)
        .await
    {
        Ok(subscription) => Some(subscription.subscription_id),
        Err(e) => {
            tracing::warn!(%user_id, error = %e, "calendar subscription could not be created");
            None
        }
    };

    Ok(Json(CallbackResponse {
        connected: true,
        external_user_id: connected.identity.id,
        email: connected.identity.email,
        subscription_id,
    }))
}

/// Provider change notifications. A `validationToken` query parameter is the
/// subscription handshake and must be echoed back verbatim as plain text.
#[axum::debug_handler]
pub async fn webhook(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
    body: String,
) -> Result<Response> {
    if let Some(token) = query.validation_token {
        return Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            token,
        )
            .into_response());
    }

    let calendar = calendar(&state)?;
    let batch: NotificationBatch = serde_json::from_str(&body)?;
    let report = calendar.reconciler.handle(&batch.value).await;
    if !report.failures.is_empty() {
        tracing::warn!(failures = report.failures.len(), "calendar notifications failed to reconcile");
    }
    Ok((StatusCode::ACCEPTED, Json(report)).into_response())
}
