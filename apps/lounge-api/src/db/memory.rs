//! In-memory [`ChatStore`] for tests and single-process demos.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lounge_common::wire::ChatMessage;
use parking_lot::RwLock;

use crate::error::ApiError;
use crate::models::chat_session::{ChatSession, NewChatSession};
use crate::models::message::{MessageRow, NewMessage};
use crate::models::room::{NewRoom, Room};
use crate::models::user::{NewUser, User};

use super::store::ChatStore;

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    sessions: HashMap<String, ChatSession>,
    rooms: HashMap<String, Room>,
    messages: Vec<MessageRow>,
}

impl Tables {
    fn render(&self, row: &MessageRow) -> Result<ChatMessage, ApiError> {
        let author = self.users.get(&row.author_id).cloned().ok_or_else(|| {
            tracing::error!(author_id = %row.author_id, "message without author row");
            ApiError::internal("An internal error occurred")
        })?;
        Ok(row.clone().with_author(author))
    }

    fn sorted_room_messages(&self, room_id: &str) -> Vec<&MessageRow> {
        let mut rows: Vec<&MessageRow> = self
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .collect();
        rows.sort_by_key(|m| (m.created_at, m.id));
        rows
    }
}

#[derive(Default)]
pub struct MemoryChatStore {
    tables: RwLock<Tables>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn get_room(&self, room_id: &str) -> Result<Option<Room>, ApiError> {
        Ok(self.tables.read().rooms.get(room_id).cloned())
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, ApiError> {
        let mut rooms: Vec<Room> = self.tables.read().rooms.values().cloned().collect();
        rooms.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(rooms)
    }

    async fn create_room(&self, room: NewRoom) -> Result<Room, ApiError> {
        let room = Room::from(room);
        self.tables
            .write()
            .rooms
            .insert(room.id.clone(), room.clone());
        Ok(room)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>, ApiError> {
        Ok(self.tables.read().sessions.get(session_id).cloned())
    }

    async fn list_sessions(&self) -> Result<Vec<ChatSession>, ApiError> {
        let mut sessions: Vec<ChatSession> =
            self.tables.read().sessions.values().cloned().collect();
        sessions.sort_by(|a, b| (a.start_date, &a.id).cmp(&(b.start_date, &b.id)));
        Ok(sessions)
    }

    async fn create_session(&self, session: NewChatSession) -> Result<ChatSession, ApiError> {
        let session = ChatSession::from(session);
        self.tables
            .write()
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn add_message(
        &self,
        author: NewUser,
        message: NewMessage,
    ) -> Result<ChatMessage, ApiError> {
        let mut tables = self.tables.write();

        if !tables.rooms.contains_key(&message.room_id) {
            return Err(ApiError::not_found("Room not found"));
        }

        let user = match tables.users.remove(&author.id) {
            Some(existing) => User {
                display_name: author.display_name,
                avatar_url: author.avatar_url,
                updated_at: author.updated_at,
                ..existing
            },
            None => User {
                id: author.id,
                display_name: author.display_name,
                avatar_url: author.avatar_url,
                created_at: author.created_at,
                updated_at: author.updated_at,
            },
        };
        tables.users.insert(user.id.clone(), user.clone());

        let row = MessageRow::from(message);
        tables.messages.push(row.clone());
        Ok(row.with_author(user))
    }

    async fn recent_messages(
        &self,
        room_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let tables = self.tables.read();
        let rows = tables.sorted_room_messages(room_id);
        let skip = rows.len().saturating_sub(limit.max(0) as usize);
        rows.into_iter()
            .skip(skip)
            .map(|row| tables.render(row))
            .collect()
    }

    async fn messages_since(
        &self,
        room_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let tables = self.tables.read();
        tables
            .sorted_room_messages(room_id)
            .into_iter()
            .filter(|row| row.created_at > since)
            .map(|row| tables.render(row))
            .collect()
    }

    async fn clear_messages(&self, room_id: &str) -> Result<u64, ApiError> {
        let mut tables = self.tables.write();
        let before = tables.messages.len();
        tables.messages.retain(|m| m.room_id != room_id);
        Ok((before - tables.messages.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn author(id: &str, name: &str) -> NewUser {
        let now = Utc::now();
        NewUser {
            id: id.to_string(),
            display_name: name.to_string(),
            avatar_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn message(id: i64, room_id: &str, author_id: &str, at: DateTime<Utc>) -> NewMessage {
        NewMessage {
            id,
            room_id: room_id.to_string(),
            author_id: author_id.to_string(),
            text: format!("message {id}"),
            created_at: at,
        }
    }

    async fn store_with_room(room_id: &str) -> MemoryChatStore {
        let store = MemoryChatStore::new();
        store
            .create_room(NewRoom {
                id: room_id.to_string(),
                name: "Lobby".to_string(),
                session_id: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn messages_since_is_strict_and_ascending() {
        let store = store_with_room("room_a").await;
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(1);
        let t3 = t1 + Duration::seconds(2);

        // Inserted out of order on purpose.
        store.add_message(author("usr_1", "Ada"), message(3, "room_a", "usr_1", t3)).await.unwrap();
        store.add_message(author("usr_1", "Ada"), message(1, "room_a", "usr_1", t1)).await.unwrap();
        store.add_message(author("usr_1", "Ada"), message(2, "room_a", "usr_1", t2)).await.unwrap();

        let since = store.messages_since("room_a", t1).await.unwrap();
        let ids: Vec<i64> = since.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn recent_messages_keeps_newest_in_ascending_order() {
        let store = store_with_room("room_a").await;
        let t0 = Utc::now();
        for i in 0..5 {
            store
                .add_message(
                    author("usr_1", "Ada"),
                    message(i, "room_a", "usr_1", t0 + Duration::seconds(i)),
                )
                .await
                .unwrap();
        }
        let ids: Vec<i64> = store
            .recent_messages("room_a", 3)
            .await
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn add_message_refreshes_author_display_data() {
        let store = store_with_room("room_a").await;
        let now = Utc::now();
        store.add_message(author("usr_1", "Ada"), message(1, "room_a", "usr_1", now)).await.unwrap();
        let second = store
            .add_message(author("usr_1", "Ada L."), message(2, "room_a", "usr_1", now))
            .await
            .unwrap();
        assert_eq!(second.author.display_name, "Ada L.");

        let all = store.recent_messages("room_a", 10).await.unwrap();
        assert!(all.iter().all(|m| m.author.display_name == "Ada L."));
    }

    #[tokio::test]
    async fn add_message_to_unknown_room_is_not_found() {
        let store = MemoryChatStore::new();
        let err = store
            .add_message(author("usr_1", "Ada"), message(1, "room_x", "usr_1", Utc::now()))
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn clear_messages_only_touches_one_room() {
        let store = store_with_room("room_a").await;
        store
            .create_room(NewRoom {
                id: "room_b".to_string(),
                name: "Other".to_string(),
                session_id: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let now = Utc::now();
        store.add_message(author("usr_1", "Ada"), message(1, "room_a", "usr_1", now)).await.unwrap();
        store.add_message(author("usr_1", "Ada"), message(2, "room_a", "usr_1", now)).await.unwrap();
        store.add_message(author("usr_1", "Ada"), message(3, "room_b", "usr_1", now)).await.unwrap();

        assert_eq!(store.clear_messages("room_a").await.unwrap(), 2);
        assert!(store.recent_messages("room_a", 10).await.unwrap().is_empty());
        assert_eq!(store.recent_messages("room_b", 10).await.unwrap().len(), 1);
    }
}
