use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::ApiError;
use crate::models::chat::Chat;
use crate::models::message::Message;
use crate::models::user::User;

/// Abstraction over the document store holding users, chats, and messages.
///
/// Every `add_*`/`mark_*` method is a set union performed atomically by the
/// store, so concurrent calls for the same message never lose updates.
/// Backed by PostgreSQL in production and an in-memory map in tests.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, ApiError>;

    async fn find_chat(&self, chat_id: &str) -> Result<Option<Chat>, ApiError>;

    async fn find_message(&self, message_id: &str) -> Result<Option<Message>, ApiError>;

    /// Add `user_id` to the message's delivered-to set. Returns the updated
    /// message, or `None` if it does not exist.
    async fn add_delivered_to(
        &self,
        message_id: &str,
        user_id: &str,
    ) -> Result<Option<Message>, ApiError>;

    /// Add every id in `user_ids` to the message's read-by set in one write.
    async fn add_read_by(
        &self,
        message_id: &str,
        user_ids: &[String],
    ) -> Result<Option<Message>, ApiError>;

    /// Mark every message in the chat that `user_id` has not read (and has
    /// not deleted for themselves) as read. Returns only the messages that
    /// changed, oldest first.
    async fn mark_chat_read(&self, chat_id: &str, user_id: &str) -> Result<Vec<Message>, ApiError>;

    /// Number of visible messages in the chat not yet read by `user_id`.
    async fn count_unread(&self, chat_id: &str, user_id: &str) -> Result<i64, ApiError>;

    async fn record_last_seen(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), ApiError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests)
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryData {
    users: HashMap<String, User>,
    chats: HashMap<String, Chat>,
    messages: HashMap<String, Message>,
}

pub struct MemoryChatStore {
    data: Mutex<MemoryData>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(MemoryData::default()),
        }
    }

    pub fn insert_user(&self, user: User) {
        self.data.lock().users.insert(user.id.clone(), user);
    }

    pub fn insert_chat(&self, chat: Chat) {
        self.data.lock().chats.insert(chat.id.clone(), chat);
    }

    pub fn insert_message(&self, message: Message) {
        self.data.lock().messages.insert(message.id.clone(), message);
    }
}

impl Default for MemoryChatStore {
    fn default() -> Self {
        Self::new()
    }
}

fn add_missing(set: &mut Vec<String>, user_id: &str) -> bool {
    if set.iter().any(|u| u == user_id) {
        return false;
    }
    set.push(user_id.to_string());
    true
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, ApiError> {
        Ok(self.data.lock().users.get(user_id).cloned())
    }

    async fn find_chat(&self, chat_id: &str) -> Result<Option<Chat>, ApiError> {
        Ok(self.data.lock().chats.get(chat_id).cloned())
    }

    async fn find_message(&self, message_id: &str) -> Result<Option<Message>, ApiError> {
        Ok(self.data.lock().messages.get(message_id).cloned())
    }

    async fn add_delivered_to(
        &self,
        message_id: &str,
        user_id: &str,
    ) -> Result<Option<Message>, ApiError> {
        let mut data = self.data.lock();
        Ok(data.messages.get_mut(message_id).map(|m| {
            add_missing(&mut m.delivered_to, user_id);
            m.clone()
        }))
    }

    async fn add_read_by(
        &self,
        message_id: &str,
        user_ids: &[String],
    ) -> Result<Option<Message>, ApiError> {
        let mut data = self.data.lock();
        Ok(data.messages.get_mut(message_id).map(|m| {
            for user_id in user_ids {
                add_missing(&mut m.read_by, user_id);
            }
            m.clone()
        }))
    }

    async fn mark_chat_read(&self, chat_id: &str, user_id: &str) -> Result<Vec<Message>, ApiError> {
        let mut data = self.data.lock();
        let mut changed: Vec<Message> = data
            .messages
            .values_mut()
            .filter(|m| m.chat_id == chat_id && !m.is_deleted_for(user_id))
            .filter_map(|m| add_missing(&mut m.read_by, user_id).then(|| m.clone()))
            .collect();
        changed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(changed)
    }

    async fn count_unread(&self, chat_id: &str, user_id: &str) -> Result<i64, ApiError> {
        let data = self.data.lock();
        let count = data
            .messages
            .values()
            .filter(|m| m.chat_id == chat_id && !m.is_deleted_for(user_id) && !m.is_read_by(user_id))
            .count();
        Ok(count as i64)
    }

    async fn record_last_seen(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), ApiError> {
        if let Some(user) = self.data.lock().users.get_mut(user_id) {
            user.last_seen_at = Some(at);
        }
        Ok(())
    }
}
