//! Room membership tracker.
//!
//! Tracks which chat rooms each live connection has joined. Membership is
//! additive for a connection's lifetime and dropped wholesale on disconnect.
//! A user counts as "in" a room while any of their connections has joined
//! it, so two devices in the same room are tracked independently.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;

#[derive(Debug)]
struct ConnectionRooms {
    user_id: String,
    rooms: HashSet<String>,
}

/// Thread-safe, DashMap-backed membership index.
pub struct RoomMembership {
    /// connection_id → joined rooms.
    by_connection: DashMap<String, ConnectionRooms>,
    /// user_id → room → number of that user's connections joined to it.
    by_user: DashMap<String, HashMap<String, usize>>,
}

impl RoomMembership {
    pub fn new() -> Self {
        Self {
            by_connection: DashMap::new(),
            by_user: DashMap::new(),
        }
    }

    /// Subscribe `connection_id` to `room_id`. Returns `false` if the
    /// connection had already joined.
    pub fn join(&self, user_id: &str, room_id: &str, connection_id: &str) -> bool {
        let inserted = {
            let mut conn = self
                .by_connection
                .entry(connection_id.to_string())
                .or_insert_with(|| ConnectionRooms {
                    user_id: user_id.to_string(),
                    rooms: HashSet::new(),
                });
            if conn.user_id != user_id {
                tracing::warn!(
                    %connection_id,
                    bound_user = %conn.user_id,
                    %user_id,
                    "join rejected: connection bound to another user"
                );
                return false;
            }
            conn.rooms.insert(room_id.to_string())
        };

        if inserted {
            *self
                .by_user
                .entry(user_id.to_string())
                .or_default()
                .entry(room_id.to_string())
                .or_insert(0) += 1;
        }
        inserted
    }

    /// Unsubscribe one connection from one room. Other connections of the
    /// same user are unaffected.
    pub fn leave(&self, room_id: &str, connection_id: &str) -> bool {
        let user_id = {
            let Some(mut conn) = self.by_connection.get_mut(connection_id) else {
                return false;
            };
            if !conn.rooms.remove(room_id) {
                return false;
            }
            conn.user_id.clone()
        };
        self.release(&user_id, std::iter::once(room_id.to_string()));
        true
    }

    /// Drop every membership held by `connection_id`. Returns the rooms it
    /// had joined.
    pub fn clear_connection(&self, connection_id: &str) -> Vec<String> {
        let Some((_, conn)) = self.by_connection.remove(connection_id) else {
            return Vec::new();
        };
        let rooms: Vec<String> = conn.rooms.into_iter().collect();
        self.release(&conn.user_id, rooms.iter().cloned());
        rooms
    }

    fn release(&self, user_id: &str, rooms: impl Iterator<Item = String>) {
        if let Some(mut counts) = self.by_user.get_mut(user_id) {
            for room in rooms {
                if let Some(n) = counts.get_mut(&room) {
                    *n -= 1;
                    if *n == 0 {
                        counts.remove(&room);
                    }
                }
            }
        }
        self.by_user.remove_if(user_id, |_, counts| counts.is_empty());
    }

    /// Whether this specific connection receives events for `room_id`.
    pub fn connection_in_room(&self, connection_id: &str, room_id: &str) -> bool {
        self.by_connection
            .get(connection_id)
            .is_some_and(|c| c.rooms.contains(room_id))
    }

    /// Whether any connection of `user_id` is viewing `room_id`.
    pub fn user_in_room(&self, user_id: &str, room_id: &str) -> bool {
        self.by_user
            .get(user_id)
            .is_some_and(|rooms| rooms.contains_key(room_id))
    }

    /// Rooms joined by one connection, sorted.
    #[cfg(test)]
    fn rooms_for_connection(&self, connection_id: &str) -> Vec<String> {
        let mut rooms: Vec<String> = self
            .by_connection
            .get(connection_id)
            .map(|c| c.rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }
}

impl Default for RoomMembership {
    fn default() -> Self {
        Self::new()
    }
}
