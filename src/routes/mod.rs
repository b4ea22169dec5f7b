pub mod calendar;
pub mod health;
pub mod interview;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::auth::require_actor;
use crate::AppState;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Full HTTP surface. Everything under `/api` requires a bearer token except
/// the provider-facing calendar callback and webhook.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/api/interviews",
            get(interview::list_lineage).post(interview::create_interview),
        )
        .route(
            "/api/interviews/:id",
            get(interview::get_interview).delete(interview::delete_interview),
        )
        .route("/api/interviews/:id/publish", post(interview::publish_interview))
        .route("/api/interviews/:id/accept", post(interview::accept_interview))
        .route("/api/interviews/:id/propose", post(interview::propose_slots))
        .route("/api/interviews/:id/reschedule", put(interview::reschedule_interview))
        .route("/api/interviews/:id/complete", post(interview::complete_interview))
        .route("/api/interviews/:id/cancel", post(interview::cancel_interview))
        .route("/api/interviews/:id/reject", post(interview::reject_interview))
        .route("/api/interviews/:id/history", get(interview::get_history))
        .route("/api/availability", post(interview::check_availability))
        .route("/api/calendar/connect", get(calendar::connect))
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_actor));

    let public = Router::new()
        .route("/health", get(health::health))
        .route("/api/calendar/callback", get(calendar::callback))
        .route("/api/calendar/webhook", post(calendar::webhook));

    public
        .merge(protected)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
