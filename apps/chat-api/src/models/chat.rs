use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::schema::chats;

/// A one-to-one or group chat. Each chat is one realtime room.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = chats)]
pub struct Chat {
    pub id: String,
    pub chat_name: Option<String>,
    pub is_group_chat: bool,
    pub group_pic: Option<String>,
    /// Participant user IDs.
    pub users: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.users.iter().any(|u| u == user_id)
    }
}
