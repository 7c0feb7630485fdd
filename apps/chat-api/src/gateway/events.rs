//! Gateway event names, payloads, and wire-format messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

/// A message sent from the server to the client over WebSocket.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayMessage {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    pub data: Value,
}

impl GatewayMessage {
    /// Build an event message. The sequence number is stamped by the
    /// connection when the message is written.
    pub fn new(event_name: &str, data: Value) -> Self {
        Self {
            event: event_name.to_string(),
            seq: None,
            data,
        }
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Build an `error` event describing why `source_event` was rejected.
    pub fn error(source_event: &str, err: &ApiError) -> Self {
        Self::new(
            EventName::ERROR,
            serde_json::json!({
                "code": err.code,
                "message": err.message,
                "event": source_event,
            }),
        )
    }

    pub fn heartbeat_ack(seq: u64) -> Self {
        Self::new(EventName::HEARTBEAT_ACK, serde_json::json!({ "ack": seq }))
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// A message received from the client over WebSocket.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl ClientMessage {
    /// Deserialize the payload, mapping failures to a `BAD_REQUEST`.
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| ApiError::bad_request(format!("Invalid {} payload: {e}", self.event)))
    }
}

// ---------------------------------------------------------------------------
// Inbound payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupPayload {
    pub user_id: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinChatPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub chat_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveChatPayload {
    pub chat_id: String,
}

/// Typing start/stop. Extra fields are relayed untouched.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub chat_id: String,
}

/// A freshly created message announced by its sender. The full client
/// payload is relayed untouched; only these fields are interpreted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessagePayload {
    pub chat_id: String,
    pub sender_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeliveredPayload {
    pub message_id: String,
    pub chat_id: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReadPayload {
    pub message_id: String,
    pub chat_id: String,
    pub read_by: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedForEveryonePayload {
    pub message_ids: Vec<String>,
    pub chat_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub seq: u64,
}

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Event names on the wire, inbound and outbound.
pub struct EventName;

impl EventName {
    // Inbound.
    pub const SETUP: &'static str = "setup";
    pub const JOIN_CHAT: &'static str = "joinChat";
    pub const LEAVE_CHAT: &'static str = "leaveChat";
    pub const TYPING: &'static str = "typing";
    pub const STOP_TYPING: &'static str = "stopTyping";
    pub const NEW_MESSAGE: &'static str = "newMessage";
    pub const MESSAGE_DELIVERED: &'static str = "messageDelivered";
    pub const MESSAGE_READ: &'static str = "messageRead";
    pub const MESSAGE_DELETED_FOR_EVERYONE: &'static str = "onMessageDeletedForEveryone";
    pub const SET_ONLINE: &'static str = "setOnline";
    pub const SET_OFFLINE: &'static str = "setOffline";
    pub const HEARTBEAT: &'static str = "heartbeat";

    // Outbound.
    pub const CONNECTED: &'static str = "connected";
    pub const JOINED: &'static str = "joined";
    pub const LEFT: &'static str = "left";
    pub const USER_ONLINE: &'static str = "userOnline";
    pub const USER_OFFLINE: &'static str = "userOffline";
    pub const MESSAGE_RECEIVED: &'static str = "messageRecieved";
    pub const MESSAGE_DELIVERY_STATUS: &'static str = "messageDeliveryStatus";
    pub const MESSAGE_READ_CONFIRMATION: &'static str = "messageReadConfirmation";
    pub const MESSAGES_DELETED_FOR_EVERYONE: &'static str = "messagesDeletedForEveryone";
    pub const HEARTBEAT_ACK: &'static str = "heartbeatAck";
    pub const ERROR: &'static str = "error";
    pub const CHAT_DELETED_ERROR: &'static str = "chatDeletedError";
}
