//! Chat session scheduling endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, SubsecRound, Utc};
use lounge_common::id::{prefix, prefixed_ulid};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::gateway::gate::{self, GateDecision};
use crate::models::chat_session::{ChatSession, NewChatSession};
use crate::permissions;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/{session_id}", get(get_session))
}

/// A session together with its gate status at request time.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub session: ChatSession,
    pub gate: GateDecision,
}

impl SessionResponse {
    fn at(session: ChatSession, now: DateTime<Utc>) -> Self {
        let gate = gate::evaluate(Some(&session), now);
        Self { session, gate }
    }
}

// ---------------------------------------------------------------------------
// POST /api/v1/sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub description: Option<String>,
    pub link: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/sessions",
    tag = "Sessions",
    security(("bearer" = [])),
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = SessionResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not an administrator", body = ApiErrorBody),
    )
)]
pub async fn create_session(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    permissions::require_admin(&state, &auth)?;

    let name = body.name.trim().to_string();
    let mut errors = Vec::new();
    if name.is_empty() {
        errors.push(FieldError {
            field: "name".to_string(),
            message: "Session name is required".to_string(),
        });
    } else if name.len() > 100 {
        errors.push(FieldError {
            field: "name".to_string(),
            message: "Session name must be 100 characters or fewer".to_string(),
        });
    }
    // Stored at microsecond precision; compare what will be stored.
    let start_date = body.start_date.trunc_subsecs(6);
    let end_date = body.end_date.trunc_subsecs(6);
    if end_date <= start_date {
        errors.push(FieldError {
            field: "end_date".to_string(),
            message: "Session must end after it starts".to_string(),
        });
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let now = Utc::now().trunc_subsecs(6);
    let session = state
        .store
        .create_session(NewChatSession {
            id: prefixed_ulid(prefix::SESSION),
            name,
            start_date,
            end_date,
            description: body.description.filter(|d| !d.trim().is_empty()),
            link: body.link.filter(|l| !l.trim().is_empty()),
            created_at: now,
        })
        .await?;

    tracing::info!(session_id = %session.id, created_by = %auth.user_id, "session created");

    Ok((StatusCode::CREATED, Json(SessionResponse::at(session, Utc::now()))))
}

// ---------------------------------------------------------------------------
// GET /api/v1/sessions
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/sessions",
    tag = "Sessions",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All sessions by start date", body = Vec<SessionResponse>),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    )
)]
pub async fn list_sessions(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<SessionResponse>>, ApiError> {
    let now = Utc::now();
    let sessions = state.store.list_sessions().await?;
    Ok(Json(
        sessions
            .into_iter()
            .map(|s| SessionResponse::at(s, now))
            .collect(),
    ))
}

// ---------------------------------------------------------------------------
// GET /api/v1/sessions/{session_id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/sessions/{session_id}",
    tag = "Sessions",
    security(("bearer" = [])),
    params(("session_id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session", body = SessionResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Session not found", body = ApiErrorBody),
    )
)]
pub async fn get_session(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state
        .store
        .get_session(&session_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Session not found"))?;
    Ok(Json(SessionResponse::at(session, Utc::now())))
}
