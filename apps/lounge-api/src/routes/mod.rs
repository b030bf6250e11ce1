pub mod health;
pub mod messages;
pub mod rooms;
pub mod sessions;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().merge(health::router()).nest(
        "/api/v1",
        crate::gateway::server::router()
            .merge(rooms::router())
            .merge(messages::router())
            .merge(sessions::router()),
    )
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Gateway
        crate::gateway::server::stream_room,
        // Rooms
        rooms::create_room,
        rooms::list_rooms,
        rooms::get_room,
        rooms::get_participants,
        // Messages
        messages::send_message,
        messages::messages_since,
        messages::clear_messages,
        // Sessions
        sessions::create_session,
        sessions::list_sessions,
        sessions::get_session,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Wire types
            lounge_common::wire::ChatMessage,
            lounge_common::wire::Author,
            lounge_common::wire::ParticipantsPayload,
            // Models
            crate::models::room::Room,
            crate::models::chat_session::ChatSession,
            crate::gateway::gate::GateDecision,
            crate::gateway::gate::SessionStatus,
            // Route request/response types
            health::HealthResponse,
            rooms::CreateRoomRequest,
            rooms::RoomResponse,
            rooms::RoomPageResponse,
            messages::SendMessageForm,
            messages::SendMessageResponse,
            messages::ClearMessagesResponse,
            sessions::CreateSessionRequest,
            sessions::SessionResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Gateway", description = "Live room event stream"),
        (name = "Rooms", description = "Chat rooms and presence"),
        (name = "Messages", description = "Sending, reconciling and clearing messages"),
        (name = "Sessions", description = "Chat session scheduling"),
    )
)]
pub struct ApiDoc;
