//! Calendar reconciliation and outbox behaviour against a real Postgres.
//! Tests return early when `DATABASE_URL` is not set and run one at a time
//! because the outbox worker claims from a shared queue.

mod common;

use std::sync::OnceLock;
use std::time::Duration;

use chrono::NaiveDate;
use common::{accepted_round, create_payload, setup, submission_status, Fixture};
use interview_scheduler::{
    config::CalendarConfig,
    dto::calendar_dto::ChangeNotification,
    dto::interview_dto::ReasonPayload,
    models::calendar::CalendarLink,
    models::interview::InterviewStatus,
    models::slot::SlotStatus,
    services::calendar_outbox_service::{self, CalendarOutboxService},
    services::calendar_provider::ProviderEvent,
    services::calendar_service::CalendarAdapter,
    services::interview_service::ProviderUpdate,
    services::reconciler_service::Reconciler,
    services::{calendar_link_service, interview_repo},
    utils::crypto::TokenCipher,
};
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN_KEY: [u8; 32] = [3u8; 32];

fn serial() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn calendar_config(base: &str) -> CalendarConfig {
    CalendarConfig {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        tenant: "tenant".to_string(),
        redirect_uri: "http://localhost/api/calendar/callback".to_string(),
        notification_url: "http://localhost/api/calendar/webhook".to_string(),
        client_state: None,
        token_key: TOKEN_KEY,
        graph_base_url: format!("{}/v1.0", base),
        login_base_url: base.to_string(),
        http_timeout_secs: 5,
        http_max_attempts: 1,
        subscription_renew_cron: "0 */30 * * * *".to_string(),
    }
}

fn adapter(f: &Fixture) -> CalendarAdapter {
    CalendarAdapter::from_config(f.config.calendar.as_ref().expect("calendar config")).expect("adapter")
}

fn encrypted_token() -> String {
    TokenCipher::new(&TOKEN_KEY).encrypt("refresh-1").unwrap()
}

async fn link(f: &Fixture, interview_id: Uuid) -> CalendarLink {
    let mut conn = f.pool.acquire().await.unwrap();
    calendar_link_service::insert(
        &mut conn,
        interview_id,
        &format!("evt-{}", Uuid::new_v4()),
        &encrypted_token(),
        f.client.user_id,
    )
    .await
    .expect("link")
}

fn deleted(event_id: &str) -> ChangeNotification {
    serde_json::from_value(json!({
        "changeType": "deleted",
        "resource": format!("Users/owner/Events/{}", event_id),
        "resourceData": { "id": event_id },
    }))
    .unwrap()
}

fn moved_to(event_id: &str, day: u32, hour: u32) -> ProviderEvent {
    let date = NaiveDate::from_ymd_opt(2026, 11, day).unwrap();
    ProviderEvent {
        id: event_id.to_string(),
        subject: Some("Technical round".to_string()),
        start: date.and_hms_opt(hour, 0, 0).unwrap(),
        end: date.and_hms_opt(hour + 1, 0, 0).unwrap(),
        time_zone: "Europe/Berlin".to_string(),
    }
}

/// Pushes every queued entry out of reach so the worker only sees rows the
/// current test creates.
async fn park_outbox(f: &Fixture) {
    sqlx::query(
        "UPDATE calendar_outbox SET next_retry_at = NOW() + interval '1 day', updated_at = NOW() WHERE status IN ('pending', 'processing')",
    )
    .execute(&f.pool)
    .await
    .unwrap();
}

/// An entry some worker claimed `minutes_ago` and never finished.
async fn processing_entry(f: &Fixture, interview_id: Uuid, minutes_ago: i32) -> Uuid {
    sqlx::query_scalar(
        r#"
        INSERT INTO calendar_outbox (interview_id, action, owning_user_id, status, attempts, created_at, updated_at)
        VALUES ($1, 'create', $2, 'processing', 1, NOW() - make_interval(mins => $3), NOW() - make_interval(mins => $3))
        RETURNING id
        "#,
    )
    .bind(interview_id)
    .bind(f.client.user_id)
    .bind(minutes_ago)
    .fetch_one(&f.pool)
    .await
    .expect("outbox entry")
}

#[tokio::test]
async fn provider_deletion_cancels_the_linked_interview() {
    let _serial = serial().lock().await;
    let Some(f) = setup(Some(calendar_config("http://127.0.0.1:9"))).await else { return };
    let reconciler = Reconciler::new(f.pool.clone(), adapter(&f), f.service.clone(), None);

    let created = f.service.create(&f.client, create_payload(&f)).await.expect("create");
    let id = created.interview.id;
    let link = link(&f, id).await;

    let report = reconciler.handle(&[deleted(&link.external_event_id)]).await;
    assert_eq!(report.cancelled, 1);
    assert!(report.failures.is_empty());

    let detail = f.service.detail(&f.client, id).await.unwrap();
    assert_eq!(detail.interview.status, InterviewStatus::Cancelled);
    assert!(detail.interview.cancel_reason.is_none());
    assert!(detail.slots.iter().all(|s| s.status == SlotStatus::Cancelled));
    assert!(!detail.calendar_synced);
    assert_eq!(submission_status(&f).await, "Interview Cancelled");
    let history = f.service.history(&f.client, id).await.unwrap();
    assert_eq!(history.last().map(|h| h.action.as_str()), Some("Calendar Event Deleted"));

    let report = reconciler.handle(&[deleted(&link.external_event_id)]).await;
    assert_eq!((report.cancelled, report.skipped), (0, 1));
}

#[tokio::test]
async fn deletion_of_an_unlinked_event_changes_nothing() {
    let _serial = serial().lock().await;
    let Some(f) = setup(Some(calendar_config("http://127.0.0.1:9"))).await else { return };
    let reconciler = Reconciler::new(f.pool.clone(), adapter(&f), f.service.clone(), None);

    let created = f.service.create(&f.client, create_payload(&f)).await.expect("create");
    let report = reconciler
        .handle(&[deleted(&format!("evt-{}", Uuid::new_v4()))])
        .await;
    assert_eq!((report.received, report.skipped, report.cancelled), (1, 1, 0));
    assert!(report.failures.is_empty());

    let detail = f.service.detail(&f.client, created.interview.id).await.unwrap();
    assert_eq!(detail.interview.status, InterviewStatus::PendingAcceptance);
    assert_eq!(submission_status(&f).await, "Interview Scheduled");
}

#[tokio::test]
async fn provider_move_collapses_pending_slots_into_one() {
    let _serial = serial().lock().await;
    let Some(f) = setup(Some(calendar_config("http://127.0.0.1:9"))).await else { return };

    let created = f.service.create(&f.client, create_payload(&f)).await.expect("create");
    let id = created.interview.id;
    let link = link(&f, id).await;

    // Lands on the first offered slot; the second one must still go away.
    let mut tx = f.pool.begin().await.unwrap();
    let update = f
        .service
        .apply_provider_update(&mut tx, &link, &moved_to(&link.external_event_id, 3, 9))
        .await
        .expect("apply");
    tx.commit().await.unwrap();
    assert_eq!(update, ProviderUpdate::Applied);

    let detail = f.service.detail(&f.client, id).await.unwrap();
    assert_eq!(detail.interview.status, InterviewStatus::PendingAcceptance);
    assert_eq!(detail.slots.len(), 1);
    assert_eq!(detail.slots[0].interview_date, NaiveDate::from_ymd_opt(2026, 11, 3).unwrap());
    assert_eq!(detail.slots[0].status, SlotStatus::Pending);
    assert_eq!(submission_status(&f).await, "Interview Rescheduled");
}

#[tokio::test]
async fn accepted_interview_treats_its_own_event_as_an_echo() {
    let _serial = serial().lock().await;
    let Some(f) = setup(Some(calendar_config("http://127.0.0.1:9"))).await else { return };

    let id = accepted_round(&f).await;
    let link = link(&f, id).await;

    let mut tx = f.pool.begin().await.unwrap();
    let update = f
        .service
        .apply_provider_update(&mut tx, &link, &moved_to(&link.external_event_id, 3, 9))
        .await
        .expect("apply");
    tx.commit().await.unwrap();
    assert_eq!(update, ProviderUpdate::Unchanged);

    let detail = f.service.detail(&f.client, id).await.unwrap();
    assert_eq!(detail.interview.status, InterviewStatus::Accepted);
    assert_eq!(detail.slots.len(), 2);
}

#[tokio::test]
async fn superseded_revision_ignores_calendar_changes() {
    let _serial = serial().lock().await;
    let Some(f) = setup(Some(calendar_config("http://127.0.0.1:9"))).await else { return };

    let first = accepted_round(&f).await;
    let stale = link(&f, first).await;
    f.service.create(&f.client, create_payload(&f)).await.expect("second round");

    let mut tx = f.pool.begin().await.unwrap();
    let update = f
        .service
        .apply_provider_update(&mut tx, &stale, &moved_to(&stale.external_event_id, 9, 15))
        .await
        .expect("apply");
    tx.commit().await.unwrap();
    assert!(matches!(update, ProviderUpdate::Ignored(_)));

    let mut conn = f.pool.acquire().await.unwrap();
    assert!(calendar_link_service::find_by_interview(&mut conn, first).await.unwrap().is_none());
    let interview = interview_repo::get(&mut conn, first).await.unwrap();
    assert_eq!(interview.status, InterviewStatus::Accepted);
    assert_eq!(interview.revision, 1);

    let relinked = link(&f, first).await;
    let mut tx = f.pool.begin().await.unwrap();
    let applied = f.service.cancel_from_provider(&mut tx, &relinked).await.expect("delete");
    tx.commit().await.unwrap();
    assert!(!applied);
    let interview = interview_repo::get(&mut conn, first).await.unwrap();
    assert_eq!(interview.status, InterviewStatus::Accepted);
}

#[tokio::test]
async fn cancel_queues_removal_of_the_linked_event() {
    let _serial = serial().lock().await;
    let Some(f) = setup(Some(calendar_config("http://127.0.0.1:9"))).await else { return };

    let created = f.service.create(&f.client, create_payload(&f)).await.expect("create");
    let id = created.interview.id;
    let link = link(&f, id).await;

    let cancelled = f
        .service
        .cancel(&f.client, id, ReasonPayload { reason: Some("role filled".into()) })
        .await
        .expect("cancel");
    assert!(cancelled.slots.iter().all(|s| s.status == SlotStatus::Cancelled));
    assert_eq!(submission_status(&f).await, "Interview Cancelled");

    let (action, event_id, status): (String, Option<String>, String) = sqlx::query_as(
        "SELECT action, external_event_id, status FROM calendar_outbox WHERE interview_id = $1",
    )
    .bind(id)
    .fetch_one(&f.pool)
    .await
    .expect("queued delete");
    assert_eq!(action, "delete");
    assert_eq!(event_id.as_deref(), Some(link.external_event_id.as_str()));
    assert_eq!(status, "pending");
}

#[tokio::test]
async fn stale_processing_entries_are_claimed_again() {
    let _serial = serial().lock().await;
    let Some(f) = setup(Some(calendar_config("http://127.0.0.1:9"))).await else { return };
    park_outbox(&f).await;

    let created = f.service.create(&f.client, create_payload(&f)).await.expect("create");
    let abandoned = processing_entry(&f, created.interview.id, 30).await;
    let in_flight = processing_entry(&f, created.interview.id, 1).await;

    let mut tx = f.pool.begin().await.unwrap();
    let claimed = calendar_outbox_service::claim_due(&mut tx).await.unwrap().expect("stale entry");
    tx.commit().await.unwrap();
    assert_eq!(claimed.id, abandoned);
    assert_ne!(claimed.id, in_flight);

    let attempts: i32 = sqlx::query_scalar("SELECT attempts FROM calendar_outbox WHERE id = $1")
        .bind(abandoned)
        .fetch_one(&f.pool)
        .await
        .unwrap();
    assert_eq!(attempts, 2);

    let mut tx = f.pool.begin().await.unwrap();
    assert!(calendar_outbox_service::claim_due(&mut tx).await.unwrap().is_none());
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn event_created_after_a_cancel_is_queued_for_removal() {
    let _serial = serial().lock().await;
    let server = MockServer::start().await;
    let Some(f) = setup(Some(calendar_config(&server.uri()))).await else { return };
    park_outbox(&f).await;

    let event_id = format!("evt-{}", Uuid::new_v4());
    Mock::given(method("POST"))
        .and(path("/tenant/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "access" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1.0/me/events"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({
                    "id": event_id,
                    "subject": "Technical round",
                    "start": { "dateTime": "2026-11-03T09:00:00.0000000", "timeZone": "Europe/Berlin" },
                    "end": { "dateTime": "2026-11-03T10:00:00.0000000", "timeZone": "Europe/Berlin" },
                }))
                .set_delay(Duration::from_millis(1500)),
        )
        .expect(1)
        .mount(&server)
        .await;

    {
        let mut conn = f.pool.acquire().await.unwrap();
        calendar_link_service::upsert_credential(&mut conn, f.client.user_id, &encrypted_token(), None)
            .await
            .unwrap();
    }
    let mut payload = create_payload(&f);
    payload.calendar_sync = true;
    let created = f.service.create(&f.client, payload).await.expect("create");
    let id = created.interview.id;

    let outbox = CalendarOutboxService::new(f.pool.clone(), adapter(&f));
    let worker = tokio::spawn(async move { outbox.run_once().await });
    tokio::time::sleep(Duration::from_millis(500)).await;
    f.service
        .cancel(&f.client, id, ReasonPayload { reason: Some("candidate withdrew".into()) })
        .await
        .expect("cancel while the event is being created");
    assert!(worker.await.unwrap().expect("worker"));

    let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
        "SELECT action, status, external_event_id FROM calendar_outbox WHERE interview_id = $1 ORDER BY created_at",
    )
    .bind(id)
    .fetch_all(&f.pool)
    .await
    .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!((rows[0].0.as_str(), rows[0].1.as_str()), ("create", "done"));
    assert_eq!((rows[1].0.as_str(), rows[1].1.as_str()), ("delete", "pending"));
    assert_eq!(rows[1].2.as_deref(), Some(event_id.as_str()));
}
