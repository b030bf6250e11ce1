use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::chat_sessions;

/// An administratively scheduled window during which a room's chat is open.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = chat_sessions)]
pub struct ChatSession {
    pub id: String,
    pub name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = chat_sessions)]
pub struct NewChatSession {
    pub id: String,
    pub name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<NewChatSession> for ChatSession {
    fn from(new: NewChatSession) -> Self {
        ChatSession {
            id: new.id,
            name: new.name,
            start_date: new.start_date,
            end_date: new.end_date,
            description: new.description,
            link: new.link,
            created_at: new.created_at,
        }
    }
}
