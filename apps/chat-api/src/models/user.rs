use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::schema::users;

/// A chat user as seen by the realtime layer.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub profile_pic: Option<String>,
    /// Device token used for push notifications.
    pub push_token: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Name shown in notifications, falling back to the user ID.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}
