mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::Utc;

use lounge_api::gateway::session::StreamSession;

// ---------------------------------------------------------------------------
// POST /api/v1/rooms
// ---------------------------------------------------------------------------

#[tokio::test]
async fn admin_creates_room_bound_to_session() {
    let (app, state) = common::test_app();
    let admin = common::login(&state, common::ADMIN_ID, "Admin").await;
    let now = Utc::now();
    let session = common::create_session(
        &state,
        now - chrono::Duration::minutes(5),
        now + chrono::Duration::hours(1),
    )
    .await;
    let server = TestServer::new(app).unwrap();

    let resp = server
        .post("/api/v1/rooms")
        .add_header(AUTHORIZATION, format!("Bearer {admin}"))
        .json(&serde_json::json!({ "name": "  Main stage ", "session_id": session.id }))
        .await;

    resp.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = resp.json();
    assert!(body["id"].as_str().unwrap().starts_with("room_"));
    assert_eq!(body["name"], "Main stage");
    assert_eq!(body["session_id"], session.id.as_str());
    assert_eq!(body["gate"]["status"], "active");
    assert!(body["gate"].get("message").is_none());
}

#[tokio::test]
async fn room_without_session_is_closed() {
    let (app, state) = common::test_app();
    let admin = common::login(&state, common::ADMIN_ID, "Admin").await;
    let server = TestServer::new(app).unwrap();

    let resp = server
        .post("/api/v1/rooms")
        .add_header(AUTHORIZATION, format!("Bearer {admin}"))
        .json(&serde_json::json!({ "name": "Hallway" }))
        .await;

    resp.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = resp.json();
    assert!(body["session_id"].is_null());
    assert_eq!(body["gate"]["status"], "closed");
    assert_eq!(
        body["gate"]["message"],
        lounge_api::gateway::gate::NO_SESSION_MESSAGE
    );
}

#[tokio::test]
async fn create_room_validates_name_and_session() {
    let (app, state) = common::test_app();
    let admin = common::login(&state, common::ADMIN_ID, "Admin").await;
    let server = TestServer::new(app).unwrap();

    let resp = server
        .post("/api/v1/rooms")
        .add_header(AUTHORIZATION, format!("Bearer {admin}"))
        .json(&serde_json::json!({ "name": " ", "session_id": "ses_missing" }))
        .await;

    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    let fields: Vec<_> = body["error"]["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(fields, vec!["name", "session_id"]);
}

#[tokio::test]
async fn create_room_requires_admin() {
    let (app, state) = common::test_app();
    let token = common::login(&state, "usr_ada", "Ada").await;
    let server = TestServer::new(app).unwrap();

    let resp = server
        .post("/api/v1/rooms")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .json(&serde_json::json!({ "name": "Mine" }))
        .await;

    resp.assert_status(StatusCode::FORBIDDEN);
    assert!(state.store.list_rooms().await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// GET /api/v1/rooms
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_rooms_reports_each_gate() {
    let (app, state) = common::test_app();
    let token = common::login(&state, "usr_ada", "Ada").await;
    let open = common::active_room(&state).await;
    let bare = common::create_room(&state, None).await;
    let server = TestServer::new(app).unwrap();

    let resp = server
        .get("/api/v1/rooms")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;

    resp.assert_status_ok();
    let body: Vec<serde_json::Value> = resp.json();
    assert_eq!(body.len(), 2);
    let status_of = |id: &str| {
        body.iter()
            .find(|r| r["id"] == id)
            .map(|r| r["gate"]["status"].as_str().unwrap().to_string())
            .unwrap()
    };
    assert_eq!(status_of(&open.id), "active");
    assert_eq!(status_of(&bare.id), "closed");
}

// ---------------------------------------------------------------------------
// GET /api/v1/rooms/{room_id}
// ---------------------------------------------------------------------------

#[tokio::test]
async fn room_page_seeds_messages_and_count_while_active() {
    let (app, state) = common::test_app();
    let token = common::login(&state, "usr_ada", "Ada").await;
    let room = common::active_room(&state).await;
    let server = TestServer::new(app).unwrap();

    for text in ["one", "two"] {
        server
            .post(&format!("/api/v1/rooms/{}/messages", room.id))
            .add_header(AUTHORIZATION, format!("Bearer {token}"))
            .form(&[("text", text)])
            .await
            .assert_status(StatusCode::CREATED);
    }
    let listener = StreamSession::new("conn_1".to_string(), room.id.clone(), "usr_bob".to_string());
    state.presence.join(&listener).await.unwrap();

    let resp = server
        .get(&format!("/api/v1/rooms/{}", room.id))
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;

    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["room"]["id"], room.id.as_str());
    assert_eq!(body["gate"]["status"], "active");
    assert_eq!(body["participants"], 1);
    let texts: Vec<_> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["one", "two"]);
}

#[tokio::test]
async fn room_page_hides_messages_outside_session() {
    let (app, state) = common::test_app();
    let token = common::login(&state, "usr_ada", "Ada").await;
    let now = Utc::now();
    let pending = common::create_session(
        &state,
        now + chrono::Duration::hours(1),
        now + chrono::Duration::hours(2),
    )
    .await;
    let room = common::create_room(&state, Some(&pending.id)).await;
    let server = TestServer::new(app).unwrap();

    let resp = server
        .get(&format!("/api/v1/rooms/{}", room.id))
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;

    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["gate"]["status"], "pending");
    assert_eq!(
        body["gate"]["message"],
        lounge_api::gateway::gate::PENDING_MESSAGE
    );
    assert!(body["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn room_page_unknown_room_is_not_found() {
    let (app, state) = common::test_app();
    let token = common::login(&state, "usr_ada", "Ada").await;
    let server = TestServer::new(app).unwrap();

    let resp = server
        .get("/api/v1/rooms/room_missing")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;

    resp.assert_status(StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// GET /api/v1/rooms/{room_id}/participants
// ---------------------------------------------------------------------------

#[tokio::test]
async fn participants_counts_authors_not_connections() {
    let (app, state) = common::test_app();
    let token = common::login(&state, "usr_ada", "Ada").await;
    let room = common::active_room(&state).await;
    let server = TestServer::new(app).unwrap();

    for (conn, author) in [("conn_1", "usr_ada"), ("conn_2", "usr_ada"), ("conn_3", "usr_bob")] {
        let session = StreamSession::new(conn.to_string(), room.id.clone(), author.to_string());
        state.presence.join(&session).await.unwrap();
    }

    let resp = server
        .get(&format!("/api/v1/rooms/{}/participants", room.id))
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;

    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body, serde_json::json!({ "count": 2 }));
}

#[tokio::test]
async fn participants_unknown_room_is_not_found() {
    let (app, state) = common::test_app();
    let token = common::login(&state, "usr_ada", "Ada").await;
    let server = TestServer::new(app).unwrap();

    let resp = server
        .get("/api/v1/rooms/room_missing/participants")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;

    resp.assert_status(StatusCode::NOT_FOUND);
}
