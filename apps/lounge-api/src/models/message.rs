use chrono::{DateTime, Utc};
use diesel::prelude::*;
use lounge_common::wire::{Author, ChatMessage};

use crate::db::schema::messages;

/// A row of the `messages` table. Clients only ever see [`ChatMessage`],
/// which carries the author's display data alongside.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = messages)]
pub struct MessageRow {
    pub id: i64,
    pub room_id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub id: i64,
    pub room_id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    pub fn with_author(self, author: impl Into<Author>) -> ChatMessage {
        ChatMessage {
            id: self.id,
            room_id: self.room_id,
            author_id: self.author_id,
            text: self.text,
            created_at: self.created_at,
            author: author.into(),
        }
    }
}

impl From<NewMessage> for MessageRow {
    fn from(new: NewMessage) -> Self {
        MessageRow {
            id: new.id,
            room_id: new.room_id,
            author_id: new.author_id,
            text: new.text,
            created_at: new.created_at,
        }
    }
}
