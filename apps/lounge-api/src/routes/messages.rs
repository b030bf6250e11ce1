//! Room message endpoints: send, reconcile and clear.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Form, Json, Router};
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use lounge_common::wire::ChatMessage;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::gateway::events::RoomEvent;
use crate::gateway::gate;
use crate::models::message::NewMessage;
use crate::models::room::Room;
use crate::permissions;
use crate::AppState;

pub const MAX_MESSAGE_CHARS: usize = 4000;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/rooms/{room_id}/messages",
        post(send_message)
            .get(messages_since)
            .delete(clear_messages),
    )
}

async fn load_room(state: &AppState, room_id: &str) -> Result<Room, ApiError> {
    state
        .store
        .get_room(room_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))
}

// ---------------------------------------------------------------------------
// POST /api/v1/rooms/{room_id}/messages
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageForm {
    pub text: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SendMessageResponse {
    pub success: bool,
    pub message: ChatMessage,
}

#[utoipa::path(
    post,
    path = "/api/v1/rooms/{room_id}/messages",
    tag = "Messages",
    security(("bearer" = [])),
    params(("room_id" = String, Path, description = "Room ID")),
    request_body(content = SendMessageForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 201, description = "Message persisted and broadcast", body = SendMessageResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Session not active", body = ApiErrorBody),
        (status = 404, description = "Room not found", body = ApiErrorBody),
    )
)]
pub async fn send_message(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Form(form): Form<SendMessageForm>,
) -> Result<(StatusCode, Json<SendMessageResponse>), ApiError> {
    let text = form.text.as_deref().map(str::trim).unwrap_or_default();
    let mut errors = Vec::new();
    if text.is_empty() {
        errors.push(FieldError {
            field: "text".to_string(),
            message: "Message text is required".to_string(),
        });
    } else if text.chars().count() > MAX_MESSAGE_CHARS {
        errors.push(FieldError {
            field: "text".to_string(),
            message: format!("Message text must be {MAX_MESSAGE_CHARS} characters or fewer"),
        });
    }
    if room_id.trim().is_empty() {
        errors.push(FieldError {
            field: "room_id".to_string(),
            message: "Room id is required".to_string(),
        });
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let room = load_room(&state, &room_id).await?;
    let decision = gate::check_room(state.store.as_ref(), &room, Utc::now()).await?;
    if !decision.is_active() {
        return Err(ApiError::forbidden(
            decision.message.unwrap_or_else(|| "Session not active".to_string()),
        ));
    }

    // Never older than the room's latest message, even if the clock stepped back.
    let mut created_at = Utc::now().trunc_subsecs(6);
    if let Some(last) = state.store.recent_messages(&room.id, 1).await?.pop() {
        created_at = created_at.max(last.created_at);
    }

    let message = state
        .store
        .add_message(
            auth.as_new_user(),
            NewMessage {
                id: state.snowflake.generate(),
                room_id: room.id.clone(),
                author_id: auth.user_id.clone(),
                text: text.to_string(),
                created_at,
            },
        )
        .await?;

    // Persisted is what counts; clients that miss the push reconcile later.
    if let Err(e) = state
        .broadcast
        .publish(&room.id, &RoomEvent::NewMessage(message.clone()))
        .await
    {
        tracing::warn!(
            room_id = %room.id,
            message_id = message.id,
            error = %e.message,
            "failed to broadcast message"
        );
    }

    tracing::debug!(room_id = %room.id, message_id = message.id, author_id = %auth.user_id, "message sent");

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            success: true,
            message,
        }),
    ))
}

// ---------------------------------------------------------------------------
// GET /api/v1/rooms/{room_id}/messages?since=
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct SinceParams {
    /// RFC 3339 timestamp, naive UTC timestamp, or epoch milliseconds.
    pub since: Option<String>,
}

/// Parse a reconciliation watermark.
pub fn parse_since(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    raw.parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}

#[utoipa::path(
    get,
    path = "/api/v1/rooms/{room_id}/messages",
    tag = "Messages",
    security(("bearer" = [])),
    params(
        ("room_id" = String, Path, description = "Room ID"),
        SinceParams,
    ),
    responses(
        (status = 200, description = "Messages created strictly after `since`, oldest first", body = Vec<ChatMessage>),
        (status = 400, description = "Missing or malformed since", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Room not found", body = ApiErrorBody),
    )
)]
pub async fn messages_since(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(params): Query<SinceParams>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let since = params
        .since
        .as_deref()
        .and_then(parse_since)
        .ok_or_else(|| ApiError::bad_request("since must be a valid timestamp"))?;

    let room = load_room(&state, &room_id).await?;
    let messages = state.store.messages_since(&room.id, since).await?;
    Ok(Json(messages))
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/rooms/{room_id}/messages
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct ClearMessagesResponse {
    pub deleted: u64,
}

#[utoipa::path(
    delete,
    path = "/api/v1/rooms/{room_id}/messages",
    tag = "Messages",
    security(("bearer" = [])),
    params(("room_id" = String, Path, description = "Room ID")),
    responses(
        (status = 200, description = "Every message of the room deleted", body = ClearMessagesResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not an administrator", body = ApiErrorBody),
        (status = 404, description = "Room not found", body = ApiErrorBody),
    )
)]
pub async fn clear_messages(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<ClearMessagesResponse>, ApiError> {
    permissions::require_admin(&state, &auth)?;
    let room = load_room(&state, &room_id).await?;

    let deleted = state.store.clear_messages(&room.id).await?;
    tracing::info!(room_id = %room.id, deleted, cleared_by = %auth.user_id, "room messages cleared");

    Ok(Json(ClearMessagesResponse { deleted }))
}
