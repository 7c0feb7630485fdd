//! PostgreSQL-backed `ChatStore`.
//!
//! Set growth on `read_by`/`delivered_to` happens inside a single `UPDATE`
//! so two concurrent receipts for the same message cannot overwrite each
//! other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use diesel::sql_types::{Array, BigInt, Text};

use crate::db::pool::DbPool;
use crate::db::schema::{chats, messages, users};
use crate::db::store::ChatStore;
use crate::error::ApiError;
use crate::models::chat::Chat;
use crate::models::message::Message;
use crate::models::user::User;

pub struct PgChatStore {
    db: DbPool,
}

impl PgChatStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, ApiError> {
        let mut conn = self.db.get().await?;
        let user = diesel_async::RunQueryDsl::get_result(
            users::table.find(user_id).select(User::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(user)
    }

    async fn find_chat(&self, chat_id: &str) -> Result<Option<Chat>, ApiError> {
        let mut conn = self.db.get().await?;
        let chat = diesel_async::RunQueryDsl::get_result(
            chats::table.find(chat_id).select(Chat::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(chat)
    }

    async fn find_message(&self, message_id: &str) -> Result<Option<Message>, ApiError> {
        let mut conn = self.db.get().await?;
        let message = diesel_async::RunQueryDsl::get_result(
            messages::table.find(message_id).select(Message::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(message)
    }

    async fn add_delivered_to(
        &self,
        message_id: &str,
        user_id: &str,
    ) -> Result<Option<Message>, ApiError> {
        let mut conn = self.db.get().await?;
        let message: Option<Message> = diesel_async::RunQueryDsl::get_result(
            diesel::sql_query(
                "UPDATE messages \
                 SET delivered_to = CASE \
                     WHEN $2 = ANY(delivered_to) THEN delivered_to \
                     ELSE array_append(delivered_to, $2) END \
                 WHERE id = $1 \
                 RETURNING *",
            )
            .bind::<Text, _>(message_id)
            .bind::<Text, _>(user_id),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(message)
    }

    async fn add_read_by(
        &self,
        message_id: &str,
        user_ids: &[String],
    ) -> Result<Option<Message>, ApiError> {
        let mut conn = self.db.get().await?;
        let message: Option<Message> = diesel_async::RunQueryDsl::get_result(
            diesel::sql_query(
                "UPDATE messages \
                 SET read_by = read_by || ARRAY( \
                     SELECT DISTINCT u FROM unnest($2::text[]) AS u \
                     WHERE NOT (u = ANY(messages.read_by))) \
                 WHERE id = $1 \
                 RETURNING *",
            )
            .bind::<Text, _>(message_id)
            .bind::<Array<Text>, _>(user_ids),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(message)
    }

    async fn mark_chat_read(&self, chat_id: &str, user_id: &str) -> Result<Vec<Message>, ApiError> {
        let mut conn = self.db.get().await?;
        let mut changed: Vec<Message> = diesel_async::RunQueryDsl::load(
            diesel::sql_query(
                "UPDATE messages \
                 SET read_by = array_append(read_by, $2) \
                 WHERE chat_id = $1 \
                   AND NOT ($2 = ANY(read_by)) \
                   AND NOT ($2 = ANY(deleted_for)) \
                 RETURNING *",
            )
            .bind::<Text, _>(chat_id)
            .bind::<Text, _>(user_id),
            &mut conn,
        )
        .await?;
        // RETURNING order is unspecified.
        changed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(changed)
    }

    async fn count_unread(&self, chat_id: &str, user_id: &str) -> Result<i64, ApiError> {
        let mut conn = self.db.get().await?;
        let row: CountRow = diesel_async::RunQueryDsl::get_result(
            diesel::sql_query(
                "SELECT COUNT(*) AS count FROM messages \
                 WHERE chat_id = $1 \
                   AND NOT ($2 = ANY(read_by)) \
                   AND NOT ($2 = ANY(deleted_for))",
            )
            .bind::<Text, _>(chat_id)
            .bind::<Text, _>(user_id),
            &mut conn,
        )
        .await?;
        Ok(row.count)
    }

    async fn record_last_seen(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), ApiError> {
        let mut conn = self.db.get().await?;
        diesel_async::RunQueryDsl::execute(
            diesel::update(users::table.find(user_id)).set(users::last_seen_at.eq(Some(at))),
            &mut conn,
        )
        .await?;
        Ok(())
    }
}
