use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::schema::messages;

/// A persisted chat message. `content` holds ciphertext.
///
/// `read_by` and `delivered_to` only ever grow; stores apply additions as
/// set unions.
#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub media: Vec<String>,
    pub read_by: Vec<String>,
    pub delivered_to: Vec<String>,
    pub deleted_for: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_read_by(&self, user_id: &str) -> bool {
        self.read_by.iter().any(|u| u == user_id)
    }

    pub fn is_delivered_to(&self, user_id: &str) -> bool {
        self.delivered_to.iter().any(|u| u == user_id)
    }

    pub fn is_deleted_for(&self, user_id: &str) -> bool {
        self.deleted_for.iter().any(|u| u == user_id)
    }
}
