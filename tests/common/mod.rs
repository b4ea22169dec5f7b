//! Shared Postgres fixture. `setup` returns `None` when `DATABASE_URL` is not
//! set so the suites degrade to no-ops on machines without a database.
#![allow(dead_code)]

use interview_scheduler::{
    config::{CalendarConfig, Config, ReschedulePolicy},
    database::pool::create_pool,
    dto::interview_dto::{AcceptInterviewPayload, CreateInterviewPayload},
    models::user::{Actor, ActorRole},
    services::interview_service::{AcceptOutcome, InterviewService},
};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

pub struct Fixture {
    pub config: Config,
    pub service: InterviewService,
    pub pool: PgPool,
    pub job_id: Uuid,
    pub candidate_id: Uuid,
    pub submission_id: Uuid,
    pub client: Actor,
    pub vendor: Actor,
    pub interviewer: Actor,
}

pub async fn user(pool: &PgPool, role: ActorRole, vendor_id: Option<Uuid>) -> Actor {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, name, email, role, vendor_id) VALUES ($1, $2, $3, $4, $5)")
        .bind(id)
        .bind(format!("{} {}", role.as_str(), id))
        .bind(format!("{}@example.test", id))
        .bind(role.as_str())
        .bind(vendor_id)
        .execute(pool)
        .await
        .expect("insert user");
    Actor { user_id: id, role }
}

pub async fn setup(calendar: Option<CalendarConfig>) -> Option<Fixture> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let config = Config {
        server_address: "127.0.0.1:0".to_string(),
        database_url,
        jwt_secret: "test_secret_key".to_string(),
        notification_webhook_url: None,
        notification_webhook_secret: None,
        reschedule_policy: ReschedulePolicy::AllowAccepted,
        calendar,
    };
    let pool = create_pool(&config).await.expect("pool");
    sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");

    let program_id = Uuid::new_v4();
    let vendor_id = Uuid::new_v4();
    let candidate_id = Uuid::new_v4();
    let job_id: Uuid = sqlx::query_scalar(
        "INSERT INTO jobs (program_id, title, status) VALUES ($1, 'Backend Engineer', 'OPEN') RETURNING id",
    )
    .bind(program_id)
    .fetch_one(&pool)
    .await
    .expect("insert job");
    let submission_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO submission_candidates (program_id, job_id, candidate_id, vendor_id, candidate_name, status)
        VALUES ($1, $2, $3, $4, 'Ada Lovelace', 'Submitted')
        RETURNING id
        "#,
    )
    .bind(program_id)
    .bind(job_id)
    .bind(candidate_id)
    .bind(vendor_id)
    .fetch_one(&pool)
    .await
    .expect("insert submission");

    Some(Fixture {
        service: InterviewService::new(pool.clone(), &config),
        client: user(&pool, ActorRole::Client, None).await,
        vendor: user(&pool, ActorRole::Vendor, Some(vendor_id)).await,
        interviewer: user(&pool, ActorRole::Interviewer, None).await,
        config,
        pool,
        job_id,
        candidate_id,
        submission_id,
    })
}

/// Two slots (Nov 3rd 09:00 and Nov 4th 14:00, Berlin), one internal
/// interviewer and one external panel address.
pub fn create_payload(f: &Fixture) -> CreateInterviewPayload {
    serde_json::from_value(json!({
        "job_id": f.job_id,
        "candidate_id": f.candidate_id,
        "title": "Technical round",
        "time_zone": "Europe/Berlin",
        "slots": [
            { "interview_date": "2026-11-03", "start_time": "09:00:00", "end_time": "10:00:00" },
            { "interview_date": "2026-11-04", "start_time": "14:00:00", "end_time": "15:00:00" }
        ],
        "interviewers": [{ "participant_id": f.interviewer.user_id }],
        "external_attendees": [{ "email": "Panel@Partner.test", "name": "Panel" }],
        "custom_fields": { "round": "technical" }
    }))
    .expect("payload")
}

pub fn accept_payload(slot_id: Uuid) -> AcceptInterviewPayload {
    AcceptInterviewPayload {
        slot_ids: vec![slot_id],
        attendee_email: None,
        notes: None,
    }
}

/// Creates a round and accepts its first slot.
pub async fn accepted_round(f: &Fixture) -> Uuid {
    let created = f.service.create(&f.client, create_payload(f)).await.expect("create");
    let outcome = f
        .service
        .accept(&f.interviewer, created.interview.id, accept_payload(created.slots[0].id))
        .await
        .expect("accept");
    assert!(matches!(outcome, AcceptOutcome::Accepted(_)));
    created.interview.id
}

pub async fn submission_status(f: &Fixture) -> String {
    sqlx::query_scalar("SELECT status FROM submission_candidates WHERE id = $1")
        .bind(f.submission_id)
        .fetch_one(&f.pool)
        .await
        .expect("submission status")
}

pub async fn set_submission_status(f: &Fixture, status: &str) {
    sqlx::query("UPDATE submission_candidates SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(f.submission_id)
        .execute(&f.pool)
        .await
        .expect("set submission status");
}
