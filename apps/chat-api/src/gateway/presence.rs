//! Connection registry: per-user presence with multi-connection support.
//!
//! Presence is per-**user**, not per-connection. A user goes offline when
//! their last connection closes, or when they explicitly ask to appear
//! offline. Every method reports whether a transition happened so the caller
//! broadcasts each change exactly once.
//!
//! All mutations run inside a single `DashMap` entry lock and never await,
//! so two handlers racing on the same user observe one consistent order.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Per-user presence record. Created on first connection, never removed.
#[derive(Debug, Clone)]
struct PresenceRecord {
    online: bool,
    /// Live connection IDs for this user.
    connections: HashSet<String>,
    /// Set whenever the user transitions to offline.
    last_seen: Option<DateTime<Utc>>,
}

/// Read-only view of a user's presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceSnapshot {
    pub online: bool,
    pub connections: usize,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Returned when a user's last live connection closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastDisconnect {
    pub last_seen: DateTime<Utc>,
    /// `false` when the user had already gone offline explicitly, so there
    /// is nothing to announce.
    pub went_offline: bool,
}

/// Thread-safe, DashMap-backed presence registry.
pub struct ConnectionRegistry {
    inner: DashMap<String, PresenceRecord>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Associate `connection_id` with `user_id` and mark the user online.
    ///
    /// Returns `true` only on an offline → online transition. Repeat calls
    /// with the same connection are no-ops.
    pub fn register_connection(&self, user_id: &str, connection_id: &str) -> bool {
        let mut entry = self
            .inner
            .entry(user_id.to_string())
            .or_insert_with(|| PresenceRecord {
                online: false,
                connections: HashSet::new(),
                last_seen: None,
            });

        entry.connections.insert(connection_id.to_string());
        if entry.online {
            return false;
        }
        entry.online = true;
        true
    }

    /// Remove `connection_id`. Returns `Some` only when it was the user's
    /// last connection; the last-seen time is refreshed either way.
    pub fn deregister_connection(&self, user_id: &str, connection_id: &str) -> Option<LastDisconnect> {
        let Some(mut entry) = self.inner.get_mut(user_id) else {
            tracing::warn!(%user_id, %connection_id, "deregister for unknown user ignored");
            return None;
        };

        if !entry.connections.remove(connection_id) {
            tracing::warn!(%user_id, %connection_id, "deregister for unknown connection ignored");
            return None;
        }

        if !entry.connections.is_empty() {
            return None;
        }

        let now = Utc::now();
        entry.last_seen = Some(now);
        let went_offline = entry.online;
        entry.online = false;
        Some(LastDisconnect {
            last_seen: now,
            went_offline,
        })
    }

    /// Explicit "app in foreground" signal. Returns `true` if the user
    /// transitioned to online. Unknown users are ignored with a warning.
    pub fn set_online(&self, user_id: &str) -> bool {
        let Some(mut entry) = self.inner.get_mut(user_id) else {
            tracing::warn!(%user_id, "set_online for unknown user ignored");
            return false;
        };
        if entry.online {
            return false;
        }
        entry.online = true;
        true
    }

    /// Explicit "app in background" signal. Returns the last-seen time if
    /// the user transitioned to offline.
    pub fn set_offline(&self, user_id: &str) -> Option<DateTime<Utc>> {
        let Some(mut entry) = self.inner.get_mut(user_id) else {
            tracing::warn!(%user_id, "set_offline for unknown user ignored");
            return None;
        };
        if !entry.online {
            return None;
        }
        let now = Utc::now();
        entry.online = false;
        entry.last_seen = Some(now);
        Some(now)
    }

    pub fn snapshot(&self, user_id: &str) -> Option<PresenceSnapshot> {
        self.inner.get(user_id).map(|e| PresenceSnapshot {
            online: e.online,
            connections: e.connections.len(),
            last_seen: e.last_seen,
        })
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.inner.get(user_id).is_some_and(|e| e.online)
    }

    /// All users currently marked online, sorted.
    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self
            .inner
            .iter()
            .filter(|e| e.online)
            .map(|e| e.key().clone())
            .collect();
        users.sort();
        users
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
