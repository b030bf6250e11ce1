//! SSE stream handler and per-connection event loop.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use lounge_common::id::{prefixed_ulid, prefix};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use utoipa::IntoParams;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::AppState;

use super::events::{self, RoomEvent};
use super::fanout::{RoomBroadcast, RoomSubscription};
use super::gate::{self, GateDecision};
use super::presence::RoomPresence;
use super::session::StreamSession;

/// Events buffered per connection before the relay loop waits on the client.
const STREAM_BUFFER: usize = 64;

pub const SESSION_STATUS_HEADER: &str = "x-session-status";
pub const SESSION_MESSAGE_HEADER: &str = "x-session-message";

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway/stream", get(stream_room))
}

// ---------------------------------------------------------------------------
// GET /api/v1/gateway/stream
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct StreamParams {
    /// Room to stream.
    #[serde(alias = "roomId")]
    pub room_id: Option<String>,
    /// Optional explicit identity; must match the authenticated user.
    #[serde(alias = "authorId")]
    pub author_id: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/gateway/stream",
    tag = "Gateway",
    security(("bearer" = [])),
    params(StreamParams),
    responses(
        (status = 200, description = "Event stream of new-message, participants and heartbeat events", content_type = "text/event-stream"),
        (status = 204, description = "Session not active; see x-session-status and x-session-message headers"),
        (status = 400, description = "Missing room_id", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Identity mismatch", body = ApiErrorBody),
        (status = 404, description = "Room not found", body = ApiErrorBody),
    )
)]
pub async fn stream_room(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Result<Response, ApiError> {
    let room_id = params
        .room_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("room_id is required"))?;

    if let Some(author_id) = params.author_id.as_deref() {
        if author_id != auth.user_id {
            return Err(ApiError::forbidden(
                "Stream identity does not match the authenticated user",
            ));
        }
    }

    let room = state
        .store
        .get_room(&room_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))?;

    let decision = gate::check_room(state.store.as_ref(), &room, Utc::now()).await?;
    if !decision.is_active() {
        tracing::debug!(
            room_id = %room.id,
            user_id = %auth.user_id,
            status = decision.status.as_str(),
            "stream refused, session not active"
        );
        return Ok(gated_response(&decision));
    }

    let session = StreamSession::new(prefixed_ulid(prefix::CONNECTION), room.id, auth.user_id);
    let manager = ConnectionManager::new(&state, session);
    let subscription = manager.start().await?;

    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    tokio::spawn(manager.run(subscription, tx));

    Ok(Sse::new(ReceiverStream::new(rx)).into_response())
}

/// `204 No Content` telling the client not to retry into a dead session.
fn gated_response(decision: &GateDecision) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static(SESSION_STATUS_HEADER),
        HeaderValue::from_static(decision.status.as_str()),
    );
    if let Some(value) = decision
        .message
        .as_deref()
        .and_then(|m| HeaderValue::from_str(m).ok())
    {
        headers.insert(HeaderName::from_static(SESSION_MESSAGE_HEADER), value);
    }
    response
}

// ---------------------------------------------------------------------------
// Connection manager
// ---------------------------------------------------------------------------

type EventSender = mpsc::Sender<Result<Event, Infallible>>;

/// Why a connection's loop ended.
#[derive(Debug, Clone, Copy)]
enum Exit {
    ClientGone,
    Superseded,
    ChannelClosed,
}

impl Exit {
    fn as_str(self) -> &'static str {
        match self {
            Exit::ClientGone => "client disconnected",
            Exit::Superseded => "superseded by a newer connection",
            Exit::ChannelClosed => "room channel closed",
        }
    }
}

/// Owns the lifecycle of one stream connection for one (room, author) pair.
#[derive(Clone)]
pub struct ConnectionManager {
    session: Arc<StreamSession>,
    presence: RoomPresence,
    broadcast: RoomBroadcast,
}

impl ConnectionManager {
    pub fn new(state: &AppState, session: StreamSession) -> Self {
        Self {
            session: Arc::new(session),
            presence: state.presence.clone(),
            broadcast: state.broadcast.clone(),
        }
    }

    /// Dedup, subscribe, then join. The order matters: the subscription must
    /// exist before the join announcement is published, or this connection
    /// would miss its own participant count.
    ///
    /// Only a failed subscribe is fatal; presence errors are logged.
    pub async fn start(&self) -> Result<RoomSubscription, ApiError> {
        let session = &self.session;

        match self
            .presence
            .evict_stale(&session.room_id, &session.author_id)
            .await
        {
            Ok(0) => {}
            Ok(evicted) => tracing::info!(
                room_id = %session.room_id,
                author_id = %session.author_id,
                evicted,
                "superseding earlier stream connection"
            ),
            Err(e) => tracing::warn!(
                room_id = %session.room_id,
                error = %e.message,
                "failed to evict stale liveness keys"
            ),
        }

        let subscription = self.broadcast.subscribe(&session.room_id).await?;

        match self.presence.join(session).await {
            Ok(count) => self.publish_count(count).await,
            Err(e) => tracing::warn!(
                room_id = %session.room_id,
                author_id = %session.author_id,
                error = %e.message,
                "failed to join presence"
            ),
        }

        tracing::info!(
            connection_id = %session.connection_id,
            room_id = %session.room_id,
            author_id = %session.author_id,
            "stream connection established"
        );

        Ok(subscription)
    }

    /// Relay loop and liveness loop, multiplexed until the connection ends.
    pub async fn run(self, mut subscription: RoomSubscription, tx: EventSender) {
        let _guard = TeardownGuard(self.clone());

        let mut ticker = time::interval(self.presence.timing().heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // First tick fires immediately; skip it.

        let exit = loop {
            tokio::select! {
                _ = tx.closed() => break Exit::ClientGone,

                event = subscription.recv() => {
                    let Some(event) = event else {
                        break Exit::ChannelClosed;
                    };
                    if !self.relay(&event, &tx).await {
                        break Exit::ClientGone;
                    }
                }

                _ = ticker.tick() => {
                    if let Some(exit) = self.liveness_tick(&tx).await {
                        break exit;
                    }
                }
            }
        };

        subscription.unsubscribe();
        self.teardown(exit).await;
    }

    /// Forward one channel event. Returns `false` once the client is gone.
    async fn relay(&self, event: &RoomEvent, tx: &EventSender) -> bool {
        match event.to_sse() {
            Ok(sse) => tx.send(Ok(sse)).await.is_ok(),
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.session.connection_id,
                    event = event.name(),
                    error = %e,
                    "failed to encode room event"
                );
                true
            }
        }
    }

    /// Check the liveness key, heartbeat, refresh, and sweep the room.
    async fn liveness_tick(&self, tx: &EventSender) -> Option<Exit> {
        let session = &self.session;

        match self.presence.is_alive(session).await {
            Ok(true) => {}
            Ok(false) => return Some(Exit::Superseded),
            Err(e) => tracing::warn!(
                connection_id = %session.connection_id,
                error = %e.message,
                "liveness check failed"
            ),
        }

        if tx.send(Ok(events::heartbeat(Utc::now()))).await.is_err() {
            return Some(Exit::ClientGone);
        }

        match self.presence.refresh(session).await {
            Ok(true) => {}
            // Deleted between the check and the refresh.
            Ok(false) => return Some(Exit::Superseded),
            Err(e) => tracing::warn!(
                connection_id = %session.connection_id,
                error = %e.message,
                "liveness refresh failed"
            ),
        }

        match self.presence.sweep(&session.room_id).await {
            Ok(Some(count)) => self.publish_count(count).await,
            Ok(None) => {}
            Err(e) => tracing::warn!(
                room_id = %session.room_id,
                error = %e.message,
                "presence sweep failed"
            ),
        }

        None
    }

    async fn publish_count(&self, count: u64) {
        if let Err(e) = self
            .broadcast
            .publish(&self.session.room_id, &RoomEvent::participants(count))
            .await
        {
            tracing::warn!(
                room_id = %self.session.room_id,
                error = %e.message,
                "failed to publish participant count"
            );
        }
    }

    /// Leave presence. Runs at most once per connection whatever triggers it.
    async fn teardown(&self, exit: Exit) {
        let session = &self.session;
        if !session.begin_teardown() {
            return;
        }

        match self.presence.leave(session).await {
            Ok(Some(count)) => self.publish_count(count).await,
            Ok(None) => {}
            Err(e) => tracing::warn!(
                room_id = %session.room_id,
                author_id = %session.author_id,
                error = %e.message,
                "failed to leave presence"
            ),
        }

        tracing::info!(
            connection_id = %session.connection_id,
            room_id = %session.room_id,
            author_id = %session.author_id,
            reason = exit.as_str(),
            "stream connection ended"
        );
    }
}

/// Runs the teardown if the connection task is dropped before it finishes,
/// e.g. on runtime shutdown or task abort.
struct TeardownGuard(ConnectionManager);

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        if self.0.session.is_torn_down() {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let manager = self.0.clone();
            handle.spawn(async move { manager.teardown(Exit::ClientGone).await });
        }
    }
}
