#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use chrono::{DateTime, Utc};
use futures_util::stream::{BoxStream, StreamExt};
use lounge_client::{SseDecoder, SseEvent};
use tokio::time;

use lounge_api::auth::tokens::{self, AccessTokenData};
use lounge_api::config::{Config, PresenceTiming};
use lounge_api::db::kv::{KeyValueStore, MemoryStore};
use lounge_api::db::memory::MemoryChatStore;
use lounge_api::db::store::ChatStore;
use lounge_api::models::chat_session::{ChatSession, NewChatSession};
use lounge_api::models::room::{NewRoom, Room};
use lounge_api::AppState;
use lounge_common::id::{prefix, prefixed_ulid};

pub const ADMIN_ID: &str = "usr_admin";

/// Short liveness timing so ungraceful-disconnect tests finish quickly.
pub const TEST_TIMING: PresenceTiming = PresenceTiming {
    liveness_ttl: Duration::from_millis(600),
    heartbeat_interval: Duration::from_millis(150),
};

/// How long a test waits for any single stream event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a test AppState backed entirely by in-memory stores.
pub fn test_state() -> AppState {
    test_state_with_timing(TEST_TIMING)
}

pub fn test_state_with_timing(timing: PresenceTiming) -> AppState {
    let mut config = Config::in_memory();
    config.admin_user_ids = vec![ADMIN_ID.to_string()];
    config.presence = timing;

    let store: Arc<dyn ChatStore> = Arc::new(MemoryChatStore::new());
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    AppState::new(config, store, kv)
}

/// Build the full application router wired to the test state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = lounge_api::routes::router().with_state(state.clone());
    (app, state)
}

/// Start an actual TCP server for stream tests. The server runs in the
/// background for the rest of the test.
pub async fn start_server(state: AppState) -> SocketAddr {
    let app = lounge_api::routes::router().with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Register an access token for the user, as the identity service would.
pub async fn login(state: &AppState, user_id: &str, display_name: &str) -> String {
    let token = tokens::generate_access_token();
    tokens::store_access_token(
        state.kv.as_ref(),
        &token,
        &AccessTokenData {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            avatar_url: None,
        },
        tokens::ACCESS_TOKEN_TTL,
    )
    .await
    .unwrap();
    token
}

pub async fn create_session(
    state: &AppState,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> ChatSession {
    state
        .store
        .create_session(NewChatSession {
            id: prefixed_ulid(prefix::SESSION),
            name: "Live Q&A".to_string(),
            start_date: start,
            end_date: end,
            description: None,
            link: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap()
}

pub async fn create_room(state: &AppState, session_id: Option<&str>) -> Room {
    state
        .store
        .create_room(NewRoom {
            id: prefixed_ulid(prefix::ROOM),
            name: "Lobby".to_string(),
            session_id: session_id.map(str::to_string),
            created_at: Utc::now(),
        })
        .await
        .unwrap()
}

/// A room whose session runs from an hour ago to an hour from now.
pub async fn active_room(state: &AppState) -> Room {
    let now = Utc::now();
    let session = create_session(
        state,
        now - chrono::Duration::hours(1),
        now + chrono::Duration::hours(1),
    )
    .await;
    create_room(state, Some(&session.id)).await
}

/// Open a raw stream request.
pub async fn open_stream(addr: SocketAddr, token: &str, room_id: &str) -> reqwest::Response {
    reqwest::Client::new()
        .get(format!("http://{addr}/api/v1/gateway/stream"))
        .bearer_auth(token)
        .query(&[("room_id", room_id)])
        .send()
        .await
        .expect("stream request")
}

/// Reads named events off a live SSE response.
pub struct EventReader {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
}

impl EventReader {
    pub fn new(response: reqwest::Response) -> Self {
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        Self {
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map(|b| b.to_vec()))
                .boxed(),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
        }
    }

    /// Next event of any kind, or `None` once the server ended the stream.
    pub async fn next(&mut self) -> Option<SseEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let chunk = time::timeout(EVENT_TIMEOUT, self.body.next())
                .await
                .expect("timed out waiting for stream data")?;
            let chunk = chunk.ok()?;
            self.pending.extend(self.decoder.push(&chunk));
        }
    }

    /// Next event other than a heartbeat.
    pub async fn next_non_heartbeat(&mut self) -> SseEvent {
        loop {
            let event = self.next().await.expect("stream ended");
            if event.event != "heartbeat" {
                return event;
            }
        }
    }

    /// Skip ahead to the next `participants` event and return its count.
    pub async fn next_count(&mut self) -> u64 {
        loop {
            let event = self.next().await.expect("stream ended");
            if event.event == "participants" {
                let payload: serde_json::Value = serde_json::from_str(&event.data).unwrap();
                return payload["count"].as_u64().unwrap();
            }
        }
    }

    /// Skip ahead to the next `new-message` event.
    pub async fn next_message(&mut self) -> serde_json::Value {
        loop {
            let event = self.next().await.expect("stream ended");
            if event.event == "new-message" {
                return serde_json::from_str(&event.data).unwrap();
            }
        }
    }

    /// Wait until the server closes the stream, ignoring anything before.
    pub async fn closed(&mut self) {
        while self.next().await.is_some() {}
    }
}
