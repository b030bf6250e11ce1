//! PostgreSQL-backed [`ChatStore`] on diesel-async.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use diesel_async::AsyncConnection;
use lounge_common::wire::ChatMessage;
use scoped_futures::ScopedFutureExt;

use crate::db::pool::DbPool;
use crate::db::schema::{chat_sessions, messages, rooms, users};
use crate::error::ApiError;
use crate::models::chat_session::{ChatSession, NewChatSession};
use crate::models::message::{MessageRow, NewMessage};
use crate::models::room::{NewRoom, Room};
use crate::models::user::{NewUser, User};

use super::store::ChatStore;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn render(rows: Vec<(MessageRow, User)>) -> Vec<ChatMessage> {
    rows.into_iter()
        .map(|(row, user)| row.with_author(user))
        .collect()
}

#[async_trait]
impl ChatStore for PgStore {
    async fn get_room(&self, room_id: &str) -> Result<Option<Room>, ApiError> {
        let mut conn = self.pool.get().await?;
        let room = diesel_async::RunQueryDsl::get_result(
            rooms::table.find(room_id).select(Room::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(room)
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, ApiError> {
        let mut conn = self.pool.get().await?;
        let rooms = diesel_async::RunQueryDsl::load(
            rooms::table
                .order((rooms::created_at.asc(), rooms::id.asc()))
                .select(Room::as_select()),
            &mut conn,
        )
        .await?;
        Ok(rooms)
    }

    async fn create_room(&self, room: NewRoom) -> Result<Room, ApiError> {
        let mut conn = self.pool.get().await?;
        let room = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(rooms::table)
                .values(&room)
                .returning(Room::as_returning()),
            &mut conn,
        )
        .await?;
        Ok(room)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>, ApiError> {
        let mut conn = self.pool.get().await?;
        let session = diesel_async::RunQueryDsl::get_result(
            chat_sessions::table
                .find(session_id)
                .select(ChatSession::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(session)
    }

    async fn list_sessions(&self) -> Result<Vec<ChatSession>, ApiError> {
        let mut conn = self.pool.get().await?;
        let sessions = diesel_async::RunQueryDsl::load(
            chat_sessions::table
                .order((chat_sessions::start_date.asc(), chat_sessions::id.asc()))
                .select(ChatSession::as_select()),
            &mut conn,
        )
        .await?;
        Ok(sessions)
    }

    async fn create_session(&self, session: NewChatSession) -> Result<ChatSession, ApiError> {
        let mut conn = self.pool.get().await?;
        let session = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(chat_sessions::table)
                .values(&session)
                .returning(ChatSession::as_returning()),
            &mut conn,
        )
        .await?;
        Ok(session)
    }

    async fn add_message(
        &self,
        author: NewUser,
        message: NewMessage,
    ) -> Result<ChatMessage, ApiError> {
        let mut conn = self.pool.get().await?;
        let author_ref = &author;
        let message_ref = &message;

        let (row, user) = conn
            .transaction::<_, ApiError, _>(|conn| {
                async move {
                    let user: User = diesel_async::RunQueryDsl::get_result(
                        diesel::insert_into(users::table)
                            .values(author_ref)
                            .on_conflict(users::id)
                            .do_update()
                            .set((
                                users::display_name.eq(&author_ref.display_name),
                                users::avatar_url.eq(&author_ref.avatar_url),
                                users::updated_at.eq(author_ref.updated_at),
                            ))
                            .returning(User::as_returning()),
                        conn,
                    )
                    .await?;

                    let row: MessageRow = diesel_async::RunQueryDsl::get_result(
                        diesel::insert_into(messages::table)
                            .values(message_ref)
                            .returning(MessageRow::as_returning()),
                        conn,
                    )
                    .await?;

                    Ok((row, user))
                }
                .scope_boxed()
            })
            .await?;

        Ok(row.with_author(user))
    }

    async fn recent_messages(
        &self,
        room_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let mut conn = self.pool.get().await?;
        let mut rows: Vec<(MessageRow, User)> = diesel_async::RunQueryDsl::load(
            messages::table
                .inner_join(users::table)
                .filter(messages::room_id.eq(room_id))
                .order((messages::created_at.desc(), messages::id.desc()))
                .limit(limit)
                .select((MessageRow::as_select(), User::as_select())),
            &mut conn,
        )
        .await?;
        rows.reverse();
        Ok(render(rows))
    }

    async fn messages_since(
        &self,
        room_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<(MessageRow, User)> = diesel_async::RunQueryDsl::load(
            messages::table
                .inner_join(users::table)
                .filter(messages::room_id.eq(room_id))
                .filter(messages::created_at.gt(since))
                .order((messages::created_at.asc(), messages::id.asc()))
                .select((MessageRow::as_select(), User::as_select())),
            &mut conn,
        )
        .await?;
        Ok(render(rows))
    }

    async fn clear_messages(&self, room_id: &str) -> Result<u64, ApiError> {
        let mut conn = self.pool.get().await?;
        let deleted = diesel_async::RunQueryDsl::execute(
            diesel::delete(messages::table.filter(messages::room_id.eq(room_id))),
            &mut conn,
        )
        .await?;
        Ok(deleted as u64)
    }
}
