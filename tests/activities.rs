use http::StatusCode;
use serde_json::{json, Value};
use tracing_test::traced_test;
use tripsync::config::features::FeatureSettings;
use tripsync::utils::activities::models::PipelineMode;

use crate::tools::{AppData, TRIP_ID, WINTER_TRIP_ID};


fn valid_body() -> Value {
    json!({
        "name": "Sunset Cruise",
        "start_date": "2025-07-04",
        "start_time": "18:00",
        "end_time": "20:00",
        "attendee_ids": ["abc", "def"],
        "idempotency_key": "cruise-1",
    })
}

async fn post_activity(app: &AppData, trip_id: i32, token: &str, body: &Value) -> reqwest::Response {
    app.client()
        .post(app.api(&format!("/api/trips/{trip_id}/activities")))
        .bearer_auth(token)
        .json(body)
        .send()
        .await
        .unwrap()
}

#[traced_test]
#[tokio::test]
async fn creates_activity_with_invites() {
    let mem = tools::seeded_backend();
    let app = AppData::new(mem.clone().into_backend()).await;
    let token = app.bearer("creator", None);

    let res = post_activity(&app, TRIP_ID, &token, &valid_body()).await;

    assert_eq!(res.status(), StatusCode::CREATED);
    assert!(res.headers().contains_key("x-correlation-id"));

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["was_deduplicated"], json!(false));
    let activity = &body["activity"];
    assert_eq!(activity["name"], json!("Sunset Cruise"));
    assert_eq!(activity["type"], json!("SCHEDULED"));
    assert_eq!(activity["starts_at"], json!("2025-07-04T18:00:00Z"));
    let invites = activity["invites"].as_array().unwrap();
    assert_eq!(invites.len(), 2);
    assert_eq!(mem.activity_count(PipelineMode::Legacy), 1);
}

#[traced_test]
#[tokio::test]
async fn double_post_with_same_key_returns_original() {
    let mem = tools::seeded_backend();
    let app = AppData::new(mem.clone().into_backend()).await;
    let token = app.bearer("creator", None);

    let first = post_activity(&app, TRIP_ID, &token, &valid_body()).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first: Value = first.json().await.unwrap();

    let second = post_activity(&app, TRIP_ID, &token, &valid_body()).await;
    assert_eq!(second.status(), StatusCode::CREATED);
    let second: Value = second.json().await.unwrap();

    assert_eq!(second["was_deduplicated"], json!(true));
    assert_eq!(second["activity"]["id"], first["activity"]["id"]);
    assert_eq!(mem.activity_count(PipelineMode::Legacy), 1);
}

#[traced_test]
#[tokio::test]
async fn legacy_validation_failure_is_400_with_field_errors() {
    let app = AppData::new(tools::seeded_backend().into_backend()).await;
    let token = app.bearer("creator", None);

    let body = json!({
        "start_date": "2025-07-04",
        "start_time": "18:00",
        "attendee_ids": ["abc"],
    });
    let res = post_activity(&app, TRIP_ID, &token, &body).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(res.headers().contains_key("x-correlation-id"));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], json!("Give this activity a name."));
    assert_eq!(body["errors"][0]["field"], json!("name"));
    assert!(body["correlation_id"].is_string());
}

#[traced_test]
#[tokio::test]
async fn end_before_start_names_the_end_time_field() {
    let app = AppData::new(tools::seeded_backend().into_backend()).await;
    let token = app.bearer("creator", None);

    let mut body = valid_body();
    body["start_time"] = json!("20:00");
    body["end_time"] = json!("18:00");
    let res = post_activity(&app, TRIP_ID, &token, &body).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["message"],
        json!("End time must be after the start time.")
    );
    assert_eq!(body["errors"][0]["field"], json!("end_time"));
}

#[traced_test]
#[tokio::test]
async fn date_outside_trip_window_quotes_the_window() {
    let app = AppData::new(tools::seeded_backend().into_backend()).await;
    let token = app.bearer("creator", None);

    let mut body = valid_body();
    body["start_date"] = json!("2024-02-15");
    let res = post_activity(&app, WINTER_TRIP_ID, &token, &body).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["message"],
        json!("Pick a date between Jan 1, 2024 and Jan 10, 2024.")
    );
}

#[traced_test]
#[tokio::test]
async fn non_member_invitee_is_400_with_invalid_ids() {
    let app = AppData::new(tools::seeded_backend().into_backend()).await;
    let token = app.bearer("creator", None);

    let mut body = valid_body();
    body["attendee_ids"] = json!(["abc", "ghost"]);
    let res = post_activity(&app, TRIP_ID, &token, &body).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["message"],
        json!("One or more invitees are no longer members of this trip.")
    );
    assert_eq!(body["invalid_invitee_ids"], json!(["ghost"]));
}

#[traced_test]
#[tokio::test]
async fn commit_time_member_removal_reports_the_same_message() {
    let mem = tools::seeded_backend();
    let app = AppData::new(mem.clone().into_backend()).await;
    let token = app.bearer("creator", None);

    // Simulates a removal that lands between validation and commit; the
    // in-memory store rechecks membership the same way the transaction does.
    mem.remove_member(TRIP_ID, "def");

    let res = post_activity(&app, TRIP_ID, &token, &valid_body()).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["message"],
        json!("One or more invitees are no longer members of this trip.")
    );
    assert_eq!(body["invalid_invitee_ids"], json!(["def"]));
}

#[traced_test]
#[tokio::test]
async fn unknown_trip_is_404() {
    let app = AppData::new(tools::seeded_backend().into_backend()).await;
    let token = app.bearer("creator", None);

    let res = post_activity(&app, 999, &token, &valid_body()).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(res.headers().contains_key("x-correlation-id"));
}

#[traced_test]
#[tokio::test]
async fn missing_token_is_401() {
    let app = AppData::new(tools::seeded_backend().into_backend()).await;

    let res = app
        .client()
        .post(app.api(&format!("/api/trips/{TRIP_ID}/activities")))
        .json(&valid_body())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[traced_test]
#[tokio::test]
async fn proposals_route_defaults_to_propose_kind() {
    let app = AppData::new(tools::seeded_backend().into_backend()).await;
    let token = app.bearer("creator", None);

    // Proposals may omit the start time entirely.
    let body = json!({
        "name": "Museum day?",
        "start_date": "2025-07-10",
        "attendee_ids": ["abc"],
    });
    let res = app
        .client()
        .post(app.api(&format!("/api/trips/{TRIP_ID}/proposals/activities")))
        .bearer_auth(&token)
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["activity"]["type"], json!("PROPOSE"));
    // Proposal invites stay pending, including the creator's own.
    for invite in body["activity"]["invites"].as_array().unwrap() {
        assert_eq!(invite["status"], json!("pending"));
    }
}

#[traced_test]
#[tokio::test]
async fn legacy_field_names_are_accepted() {
    let app = AppData::new(tools::seeded_backend().into_backend()).await;
    let token = app.bearer("creator", None);

    let body = json!({
        "title": "Tapas crawl",
        "date": "2025-07-05",
        "startTime": "19:30",
        "invitee_ids": ["abc"],
        "max_participants": "8",
        "cost": "25.50",
    });
    let res = post_activity(&app, TRIP_ID, &token, &body).await;

    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["activity"]["name"], json!("Tapas crawl"));
    assert_eq!(body["activity"]["max_capacity"], json!(8));
    assert_eq!(body["activity"]["cost"], json!("25.50"));
}

#[traced_test]
#[tokio::test]
async fn v2_header_without_flag_stays_on_legacy() {
    let mem = tools::seeded_backend();
    let app = AppData::new(mem.clone().into_backend()).await;
    let token = app.bearer("creator", None);

    let res = app
        .client()
        .post(app.api(&format!("/api/trips/{TRIP_ID}/activities")))
        .bearer_auth(&token)
        .header("x-activities-version", "2")
        .json(&valid_body())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(mem.activity_count(PipelineMode::Legacy), 1);
    assert_eq!(mem.activity_count(PipelineMode::V2), 0);
}

#[traced_test]
#[tokio::test]
async fn v2_flag_and_header_route_to_v2_and_fail_with_422() {
    let mem = tools::seeded_backend();
    let features = FeatureSettings {
        activities_v2_enabled: true,
    };
    let app = AppData::with_features(mem.clone().into_backend(), features).await;
    let token = app.bearer("creator", None);

    let res = app
        .client()
        .post(app.api(&format!("/api/trips/{TRIP_ID}/activities")))
        .bearer_auth(&token)
        .header("x-activities-version", "2")
        .json(&valid_body())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(mem.activity_count(PipelineMode::V2), 1);
    assert_eq!(mem.activity_count(PipelineMode::Legacy), 0);

    // Same failure that the legacy pipeline reports as 400.
    let res = app
        .client()
        .post(app.api(&format!("/api/trips/{TRIP_ID}/activities")))
        .bearer_auth(&token)
        .header("x-activities-version", "2")
        .json(&json!({ "start_date": "2025-07-04", "attendee_ids": ["abc"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[traced_test]
#[tokio::test]
async fn client_correlation_id_is_echoed_back() {
    let app = AppData::new(tools::seeded_backend().into_backend()).await;
    let token = app.bearer("creator", None);
    let id = uuid::Uuid::new_v4().to_string();

    let res = app
        .client()
        .post(app.api(&format!("/api/trips/{TRIP_ID}/activities")))
        .bearer_auth(&token)
        .header("x-correlation-id", &id)
        .json(&valid_body())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers()["x-correlation-id"].to_str().unwrap(), id);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["correlation_id"], json!(id));
}

#[traced_test]
#[tokio::test]
async fn user_timezone_claim_shifts_bare_dates() {
    let app = AppData::new(tools::seeded_backend().into_backend()).await;
    let token = app.bearer("creator", Some("+02:00"));

    let mut body = valid_body();
    body["idempotency_key"] = json!("tz-check");
    // Winter trip has no trip-level timezone, so the claim wins.
    body["start_date"] = json!("2024-01-05");
    let res = post_activity(&app, WINTER_TRIP_ID, &token, &body).await;

    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    // 18:00 at +02:00, reported in UTC.
    assert_eq!(body["activity"]["starts_at"], json!("2024-01-05T16:00:00Z"));
}
