use chrono::{DateTime, Utc};
use diesel::prelude::*;
use lounge_common::wire::Author;

use crate::db::schema::users;

/// Local copy of an author's display data, refreshed from the resolved
/// identity whenever they send a message.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for Author {
    fn from(user: User) -> Self {
        Author {
            id: user.id,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
        }
    }
}

impl From<NewUser> for Author {
    fn from(user: NewUser) -> Self {
        Author {
            id: user.id,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
        }
    }
}
