//! Room endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SubsecRound, Utc};
use lounge_common::id::{prefix, prefixed_ulid};
use lounge_common::wire::{ChatMessage, ParticipantsPayload};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::gateway::gate::{self, GateDecision};
use crate::models::room::{NewRoom, Room};
use crate::permissions;
use crate::AppState;

/// How many messages the room page seeds a client timeline with.
pub const RECENT_MESSAGES: i64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", post(create_room).get(list_rooms))
        .route("/rooms/{room_id}", get(get_room))
        .route("/rooms/{room_id}/participants", get(get_participants))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoomResponse {
    #[serde(flatten)]
    pub room: Room,
    pub gate: GateDecision,
}

// ---------------------------------------------------------------------------
// POST /api/v1/rooms
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoomRequest {
    pub name: String,
    pub session_id: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/rooms",
    tag = "Rooms",
    security(("bearer" = [])),
    request_body = CreateRoomRequest,
    responses(
        (status = 201, description = "Room created", body = RoomResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not an administrator", body = ApiErrorBody),
    )
)]
pub async fn create_room(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<RoomResponse>), ApiError> {
    permissions::require_admin(&state, &auth)?;

    let name = body.name.trim().to_string();
    let mut errors = Vec::new();
    if name.is_empty() {
        errors.push(FieldError {
            field: "name".to_string(),
            message: "Room name is required".to_string(),
        });
    } else if name.len() > 100 {
        errors.push(FieldError {
            field: "name".to_string(),
            message: "Room name must be 100 characters or fewer".to_string(),
        });
    }

    let session_id = body.session_id.filter(|id| !id.trim().is_empty());
    let session = match &session_id {
        Some(id) => {
            let session = state.store.get_session(id).await?;
            if session.is_none() {
                errors.push(FieldError {
                    field: "session_id".to_string(),
                    message: "Session not found".to_string(),
                });
            }
            session
        }
        None => None,
    };
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let room = state
        .store
        .create_room(NewRoom {
            id: prefixed_ulid(prefix::ROOM),
            name,
            session_id,
            created_at: Utc::now().trunc_subsecs(6),
        })
        .await?;

    tracing::info!(room_id = %room.id, created_by = %auth.user_id, "room created");

    let gate = gate::evaluate(session.as_ref(), Utc::now());
    Ok((StatusCode::CREATED, Json(RoomResponse { room, gate })))
}

// ---------------------------------------------------------------------------
// GET /api/v1/rooms
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/rooms",
    tag = "Rooms",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All rooms with their current gate status", body = Vec<RoomResponse>),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    )
)]
pub async fn list_rooms(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<RoomResponse>>, ApiError> {
    let now = Utc::now();
    let rooms = state.store.list_rooms().await?;

    let mut out = Vec::with_capacity(rooms.len());
    for room in rooms {
        let gate = gate::check_room(state.store.as_ref(), &room, now).await?;
        out.push(RoomResponse { room, gate });
    }
    Ok(Json(out))
}

// ---------------------------------------------------------------------------
// GET /api/v1/rooms/{room_id}
// ---------------------------------------------------------------------------

/// Everything a client needs to render a room before its stream connects.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoomPageResponse {
    pub room: Room,
    pub gate: GateDecision,
    pub participants: u64,
    /// Most recent messages, oldest first. Empty unless the session is active.
    pub messages: Vec<ChatMessage>,
}

#[utoipa::path(
    get,
    path = "/api/v1/rooms/{room_id}",
    tag = "Rooms",
    security(("bearer" = [])),
    params(("room_id" = String, Path, description = "Room ID")),
    responses(
        (status = 200, description = "Room page data", body = RoomPageResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Room not found", body = ApiErrorBody),
    )
)]
pub async fn get_room(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomPageResponse>, ApiError> {
    let room = state
        .store
        .get_room(&room_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))?;

    let gate = gate::check_room(state.store.as_ref(), &room, Utc::now()).await?;
    let messages = if gate.is_active() {
        state.store.recent_messages(&room.id, RECENT_MESSAGES).await?
    } else {
        Vec::new()
    };
    let participants = state.presence.count(&room.id).await?;

    Ok(Json(RoomPageResponse {
        room,
        gate,
        participants,
        messages,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/v1/rooms/{room_id}/participants
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/rooms/{room_id}/participants",
    tag = "Rooms",
    security(("bearer" = [])),
    params(("room_id" = String, Path, description = "Room ID")),
    responses(
        (status = 200, description = "Current participant count", body = ParticipantsPayload),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Room not found", body = ApiErrorBody),
    )
)]
pub async fn get_participants(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<ParticipantsPayload>, ApiError> {
    if state.store.get_room(&room_id).await?.is_none() {
        return Err(ApiError::not_found("Room not found"));
    }
    let count = state.presence.count(&room_id).await?;
    Ok(Json(ParticipantsPayload { count }))
}
