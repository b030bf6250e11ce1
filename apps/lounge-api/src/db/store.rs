use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lounge_common::wire::ChatMessage;

use crate::error::ApiError;
use crate::models::chat_session::{ChatSession, NewChatSession};
use crate::models::message::NewMessage;
use crate::models::room::{NewRoom, Room};
use crate::models::user::NewUser;

/// Durable storage for rooms, sessions and the per-room message log.
///
/// Backed by PostgreSQL in production and an in-memory map in tests. Message
/// listings are always ascending by `(created_at, id)`.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn get_room(&self, room_id: &str) -> Result<Option<Room>, ApiError>;
    async fn list_rooms(&self) -> Result<Vec<Room>, ApiError>;
    async fn create_room(&self, room: NewRoom) -> Result<Room, ApiError>;

    async fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>, ApiError>;
    async fn list_sessions(&self) -> Result<Vec<ChatSession>, ApiError>;
    async fn create_session(&self, session: NewChatSession) -> Result<ChatSession, ApiError>;

    /// Upsert the author's display data and append the message.
    async fn add_message(&self, author: NewUser, message: NewMessage)
        -> Result<ChatMessage, ApiError>;
    /// The newest `limit` messages of a room, oldest first.
    async fn recent_messages(&self, room_id: &str, limit: i64)
        -> Result<Vec<ChatMessage>, ApiError>;
    /// Every message created strictly after `since`, oldest first.
    async fn messages_since(
        &self,
        room_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>, ApiError>;
    /// Delete every message of a room. Returns how many were removed.
    async fn clear_messages(&self, room_id: &str) -> Result<u64, ApiError>;
}
