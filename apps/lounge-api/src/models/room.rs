use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::rooms;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = rooms)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = rooms)]
pub struct NewRoom {
    pub id: String,
    pub name: String,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<NewRoom> for Room {
    fn from(new: NewRoom) -> Self {
        Room {
            id: new.id,
            name: new.name,
            session_id: new.session_id,
            created_at: new.created_at,
        }
    }
}
