mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::{Duration, SecondsFormat, Utc};

fn window(start_offset: Duration, end_offset: Duration) -> (String, String) {
    let now = Utc::now();
    (
        (now + start_offset).to_rfc3339_opts(SecondsFormat::Millis, true),
        (now + end_offset).to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

#[tokio::test]
async fn admin_creates_session() {
    let (app, state) = common::test_app();
    let admin = common::login(&state, common::ADMIN_ID, "Admin").await;
    let server = TestServer::new(app).unwrap();
    let (start, end) = window(Duration::hours(1), Duration::hours(2));

    let resp = server
        .post("/api/v1/sessions")
        .add_header(AUTHORIZATION, format!("Bearer {admin}"))
        .json(&serde_json::json!({
            "name": "Keynote",
            "start_date": start,
            "end_date": end,
            "description": "Opening talk",
            "link": "",
        }))
        .await;

    resp.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = resp.json();
    assert!(body["id"].as_str().unwrap().starts_with("ses_"));
    assert_eq!(body["name"], "Keynote");
    assert_eq!(body["description"], "Opening talk");
    assert!(body["link"].is_null());
    assert_eq!(body["gate"]["status"], "pending");
}

#[tokio::test]
async fn session_must_end_after_it_starts() {
    let (app, state) = common::test_app();
    let admin = common::login(&state, common::ADMIN_ID, "Admin").await;
    let server = TestServer::new(app).unwrap();
    let (start, end) = window(Duration::hours(2), Duration::hours(1));

    let resp = server
        .post("/api/v1/sessions")
        .add_header(AUTHORIZATION, format!("Bearer {admin}"))
        .json(&serde_json::json!({ "name": "Backwards", "start_date": start, "end_date": end }))
        .await;

    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["details"][0]["field"], "end_date");
}

#[tokio::test]
async fn session_bounds_equal_after_microsecond_truncation_are_rejected() {
    let (app, state) = common::test_app();
    let admin = common::login(&state, common::ADMIN_ID, "Admin").await;
    let server = TestServer::new(app).unwrap();

    let resp = server
        .post("/api/v1/sessions")
        .add_header(AUTHORIZATION, format!("Bearer {admin}"))
        .json(&serde_json::json!({
            "name": "Blink",
            "start_date": "2030-01-01T00:00:00.0000001Z",
            "end_date": "2030-01-01T00:00:00.0000009Z",
        }))
        .await;

    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["details"][0]["field"], "end_date");
    assert!(state.store.list_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn create_session_requires_admin() {
    let (app, state) = common::test_app();
    let token = common::login(&state, "usr_ada", "Ada").await;
    let server = TestServer::new(app).unwrap();
    let (start, end) = window(Duration::hours(1), Duration::hours(2));

    let resp = server
        .post("/api/v1/sessions")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .json(&serde_json::json!({ "name": "Sneaky", "start_date": start, "end_date": end }))
        .await;

    resp.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn list_sessions_orders_by_start_and_reports_status() {
    let (app, state) = common::test_app();
    let token = common::login(&state, "usr_ada", "Ada").await;
    let now = Utc::now();
    let later = common::create_session(&state, now + Duration::hours(1), now + Duration::hours(2)).await;
    let earlier = common::create_session(&state, now - Duration::hours(3), now - Duration::hours(2)).await;
    let current = common::create_session(&state, now - Duration::hours(1), now + Duration::hours(1)).await;
    let server = TestServer::new(app).unwrap();

    let resp = server
        .get("/api/v1/sessions")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;

    resp.assert_status_ok();
    let body: Vec<serde_json::Value> = resp.json();
    let summary: Vec<(String, String)> = body
        .iter()
        .map(|s| {
            (
                s["id"].as_str().unwrap().to_string(),
                s["gate"]["status"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            (earlier.id, "closed".to_string()),
            (current.id, "active".to_string()),
            (later.id, "pending".to_string()),
        ]
    );
}

#[tokio::test]
async fn get_session_by_id() {
    let (app, state) = common::test_app();
    let token = common::login(&state, "usr_ada", "Ada").await;
    let now = Utc::now();
    let session = common::create_session(&state, now - Duration::hours(1), now + Duration::hours(1)).await;
    let server = TestServer::new(app).unwrap();

    let resp = server
        .get(&format!("/api/v1/sessions/{}", session.id))
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["id"], session.id.as_str());
    assert_eq!(body["gate"]["status"], "active");

    let missing = server
        .get("/api/v1/sessions/ses_missing")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    missing.assert_status(StatusCode::NOT_FOUND);
}
