//! Per-connection socket state.

use std::sync::atomic::{AtomicU64, Ordering};

use super::fanout::{Audience, BroadcastPayload};
use super::rooms::RoomMembership;

/// State for a single WebSocket connection.
pub struct ConnectionSession {
    /// Unique connection identifier (`conn_` prefixed ULID).
    pub connection_id: String,
    /// Identity bound by `setup`. `None` until then.
    pub user_id: Option<String>,
    /// Monotonically increasing sequence number for outbound events.
    seq: AtomicU64,
}

impl ConnectionSession {
    pub fn new(connection_id: String) -> Self {
        Self {
            connection_id,
            user_id: None,
            seq: AtomicU64::new(0),
        }
    }

    /// Get the next sequence number for an outbound event.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Check whether this connection should receive a broadcast.
    pub fn should_receive(&self, payload: &BroadcastPayload, rooms: &RoomMembership) -> bool {
        if payload.exclude_connection.as_deref() == Some(self.connection_id.as_str()) {
            return false;
        }
        let Some(user_id) = self.user_id.as_deref() else {
            return false;
        };
        match &payload.audience {
            Audience::Everyone => true,
            Audience::User(target) => target == user_id,
            Audience::Room(room_id) => rooms.connection_in_room(&self.connection_id, room_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn bound(conn: &str, user: &str) -> ConnectionSession {
        let mut s = ConnectionSession::new(conn.to_string());
        s.user_id = Some(user.to_string());
        s
    }

    #[test]
    fn seq_increments_from_one() {
        let s = ConnectionSession::new("c1".to_string());
        assert_eq!(s.next_seq(), 1);
        assert_eq!(s.next_seq(), 2);
    }

    #[test]
    fn unbound_connection_receives_nothing() {
        let rooms = RoomMembership::new();
        let s = ConnectionSession::new("c1".to_string());
        let p = BroadcastPayload::new(Audience::Everyone, "userOnline", Value::Null);
        assert!(!s.should_receive(&p, &rooms));
    }

    #[test]
    fn room_audience_requires_join_of_this_connection() {
        let rooms = RoomMembership::new();
        let s1 = bound("c1", "u1");
        let s2 = bound("c2", "u1");
        rooms.join("u1", "r1", "c1");

        let p = BroadcastPayload::to_room("r1", "typing", Value::Null);
        assert!(s1.should_receive(&p, &rooms));
        assert!(!s2.should_receive(&p, &rooms));
        assert!(!s1.should_receive(&p.clone().excluding("c1"), &rooms));
    }

    #[test]
    fn user_audience_matches_bound_identity() {
        let rooms = RoomMembership::new();
        let p = BroadcastPayload::new(Audience::User("u1".to_string()), "messageRecieved", Value::Null);
        assert!(bound("c1", "u1").should_receive(&p, &rooms));
        assert!(!bound("c2", "u2").should_receive(&p, &rooms));
    }
}
