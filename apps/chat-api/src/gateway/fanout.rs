//! Broadcast hub for dispatching gateway events to connected sockets.
//!
//! Uses a single `tokio::sync::broadcast` channel. Each connection
//! subscribes and filters events locally by audience (its joined rooms, its
//! bound user). One FIFO channel means every subscriber sees the events of a
//! room in the order they were dispatched.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

/// Capacity of the broadcast channel. Slow receivers that fall behind will
/// skip messages (RecvError::Lagged).
const BROADCAST_CAPACITY: usize = 4096;

/// Who an event is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every connection with a registered identity.
    Everyone,
    /// Connections that have joined this chat room.
    Room(String),
    /// Every connection bound to this user.
    User(String),
}

/// A payload broadcast to all connected sockets.
#[derive(Debug, Clone)]
pub struct BroadcastPayload {
    pub audience: Audience,
    /// The event name (e.g. "messageReadConfirmation").
    pub event_name: String,
    /// Serialized event data (serde_json::Value).
    pub data: Value,
    /// Connection that must not receive this event (the actor, for
    /// self-excluded events such as typing).
    pub exclude_connection: Option<String>,
}

impl BroadcastPayload {
    pub fn new(audience: Audience, event_name: &str, data: Value) -> Self {
        Self {
            audience,
            event_name: event_name.to_string(),
            data,
            exclude_connection: None,
        }
    }

    pub fn to_room(chat_id: &str, event_name: &str, data: Value) -> Self {
        Self::new(Audience::Room(chat_id.to_string()), event_name, data)
    }

    pub fn excluding(mut self, connection_id: &str) -> Self {
        self.exclude_connection = Some(connection_id.to_string());
        self
    }
}

/// The global broadcast hub, shared through `AppState`.
#[derive(Clone)]
pub struct GatewayBroadcast {
    sender: broadcast::Sender<Arc<BroadcastPayload>>,
}

impl GatewayBroadcast {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    /// Subscribe to the broadcast channel. Each connection should call
    /// this once to get its own receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BroadcastPayload>> {
        self.sender.subscribe()
    }

    /// Dispatch an event to all connected sockets.
    pub fn dispatch(&self, payload: BroadcastPayload) {
        tracing::trace!(
            event = %payload.event_name,
            audience = ?payload.audience,
            "dispatching gateway event"
        );
        // send() only fails when nobody is subscribed.
        let _ = self.sender.send(Arc::new(payload));
    }
}

impl Default for GatewayBroadcast {
    fn default() -> Self {
        Self::new()
    }
}
