//! Delivery/read-state reconciliation.
//!
//! Receipts grow the per-message `delivered_to`/`read_by` sets through the
//! store's atomic set union, then the reconciled state is broadcast to the
//! whole room, actor included. There is no stored status field: the
//! aggregate status is derived from set sizes whenever it is needed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::crypto::ContentCipher;
use crate::error::{ApiError, FieldError};
use crate::models::chat::Chat;
use crate::models::message::Message;
use crate::AppState;

use super::events::{
    DeletedForEveryonePayload, EventName, MessageDeliveredPayload, MessageReadPayload,
};
use super::fanout::BroadcastPayload;

/// Aggregate progress of a message towards being read by every recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryStatus {
    Sent,
    PartiallyDelivered,
    Delivered,
    PartiallyRead,
    Read,
}

/// Derive the status from set membership. Recipients are the participants
/// other than the sender; a reader also counts as delivered.
pub fn aggregate_status(message: &Message, participants: &[String]) -> DeliveryStatus {
    let recipients: Vec<&String> = participants
        .iter()
        .filter(|p| **p != message.sender_id)
        .collect();
    let total = recipients.len();
    if total == 0 {
        return DeliveryStatus::Sent;
    }

    let read = recipients.iter().filter(|p| message.is_read_by(p)).count();
    let delivered = recipients
        .iter()
        .filter(|p| message.is_read_by(p) || message.is_delivered_to(p))
        .count();

    if read == total {
        DeliveryStatus::Read
    } else if read > 0 {
        DeliveryStatus::PartiallyRead
    } else if delivered == total {
        DeliveryStatus::Delivered
    } else if delivered > 0 {
        DeliveryStatus::PartiallyDelivered
    } else {
        DeliveryStatus::Sent
    }
}

/// A message as broadcast to room subscribers, with decrypted content.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub media: Vec<String>,
    pub read_by: Vec<String>,
    pub delivered_to: Vec<String>,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
}

impl MessageView {
    pub fn build(message: &Message, chat: &Chat, cipher: &dyn ContentCipher) -> Self {
        Self {
            id: message.id.clone(),
            chat_id: message.chat_id.clone(),
            sender_id: message.sender_id.clone(),
            content: cipher.decrypt_or_empty(&message.content),
            media: message.media.clone(),
            read_by: message.read_by.clone(),
            delivered_to: message.delivered_to.clone(),
            status: aggregate_status(message, &chat.users),
            created_at: message.created_at,
        }
    }
}

/// Load a chat and check that `actor` participates in it.
pub async fn load_chat_for(state: &AppState, chat_id: &str, actor: &str) -> Result<Chat, ApiError> {
    let chat = state
        .store
        .find_chat(chat_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chat not found"))?;
    if !chat.is_participant(actor) {
        return Err(ApiError::forbidden("Not a participant of this chat"));
    }
    Ok(chat)
}

async fn ensure_message_in_chat(
    state: &AppState,
    message_id: &str,
    chat_id: &str,
) -> Result<(), ApiError> {
    match state.store.find_message(message_id).await? {
        Some(m) if m.chat_id == chat_id => Ok(()),
        _ => Err(ApiError::not_found("Message not found")),
    }
}

fn read_confirmation(chat: &Chat, read_by: &[String], views: Vec<MessageView>) -> Value {
    serde_json::json!({
        "chatId": chat.id,
        "readBy": read_by,
        "messages": views,
    })
}

/// Record that `payload.user_id` received a message and broadcast the
/// delivery status to the room.
pub async fn mark_delivered(
    state: &AppState,
    actor: &str,
    payload: MessageDeliveredPayload,
) -> Result<Message, ApiError> {
    if payload.user_id != actor {
        return Err(ApiError::unauthorized("userId does not match this connection"));
    }
    let chat = load_chat_for(state, &payload.chat_id, actor).await?;
    ensure_message_in_chat(state, &payload.message_id, &chat.id).await?;

    let message = state
        .store
        .add_delivered_to(&payload.message_id, actor)
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;

    let status = aggregate_status(&message, &chat.users);
    state.broadcast.dispatch(BroadcastPayload::to_room(
        &chat.id,
        EventName::MESSAGE_DELIVERY_STATUS,
        serde_json::json!({
            "messageId": message.id,
            "chatId": chat.id,
            "userId": actor,
            "deliveredTo": message.delivered_to,
            "status": status,
        }),
    ));

    tracing::debug!(message_id = %message.id, user_id = %actor, ?status, "message delivered");
    Ok(message)
}

/// Add a batch of readers to a message in one write and broadcast the
/// reconciled message to the room.
pub async fn mark_read(
    state: &AppState,
    actor: &str,
    payload: MessageReadPayload,
) -> Result<Message, ApiError> {
    if payload.read_by.is_empty() {
        return Err(ApiError::validation(vec![FieldError {
            field: "readBy".to_string(),
            message: "At least one reader is required".to_string(),
        }]));
    }
    let chat = load_chat_for(state, &payload.chat_id, actor).await?;

    let (readers, dropped): (Vec<String>, Vec<String>) = payload
        .read_by
        .into_iter()
        .partition(|u| chat.is_participant(u));
    if !dropped.is_empty() {
        tracing::warn!(chat_id = %chat.id, ?dropped, "ignoring readers outside the chat");
    }
    if readers.is_empty() {
        return Err(ApiError::forbidden("No readers belong to this chat"));
    }

    ensure_message_in_chat(state, &payload.message_id, &chat.id).await?;
    let message = state
        .store
        .add_read_by(&payload.message_id, &readers)
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;

    let view = MessageView::build(&message, &chat, state.cipher.as_ref());
    state.broadcast.dispatch(BroadcastPayload::to_room(
        &chat.id,
        EventName::MESSAGE_READ_CONFIRMATION,
        read_confirmation(&chat, &readers, vec![view]),
    ));

    tracing::debug!(message_id = %message.id, readers = readers.len(), "message read");
    Ok(message)
}

/// Mark everything in `chat` that `user_id` has not read as read, and
/// broadcast one confirmation carrying every changed message. Returns the
/// number of messages marked.
pub async fn catch_up(state: &AppState, chat: &Chat, user_id: &str) -> Result<usize, ApiError> {
    let changed = state.store.mark_chat_read(&chat.id, user_id).await?;
    if changed.is_empty() {
        return Ok(0);
    }

    let views: Vec<MessageView> = changed
        .iter()
        .map(|m| MessageView::build(m, chat, state.cipher.as_ref()))
        .collect();
    state.broadcast.dispatch(BroadcastPayload::to_room(
        &chat.id,
        EventName::MESSAGE_READ_CONFIRMATION,
        read_confirmation(chat, &[user_id.to_string()], views),
    ));

    tracing::debug!(chat_id = %chat.id, %user_id, count = changed.len(), "catch-up read");
    Ok(changed.len())
}

/// Announce a delete-for-everyone to the room. Existence and permission were
/// checked by the caller that performed the deletion.
pub fn mark_deleted_for_everyone(state: &AppState, payload: DeletedForEveryonePayload) {
    state.broadcast.dispatch(BroadcastPayload::to_room(
        &payload.chat_id,
        EventName::MESSAGES_DELETED_FOR_EVERYONE,
        serde_json::json!({
            "messageIds": payload.message_ids,
            "chatId": payload.chat_id,
        }),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(read_by: &[&str], delivered_to: &[&str]) -> Message {
        Message {
            id: "m1".to_string(),
            chat_id: "c1".to_string(),
            sender_id: "s".to_string(),
            content: String::new(),
            media: Vec::new(),
            read_by: read_by.iter().map(|s| s.to_string()).collect(),
            delivered_to: delivered_to.iter().map(|s| s.to_string()).collect(),
            deleted_for: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn participants() -> Vec<String> {
        ["s", "a", "b"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn status_progresses_with_set_growth() {
        let p = participants();
        assert_eq!(aggregate_status(&msg(&["s"], &[]), &p), DeliveryStatus::Sent);
        assert_eq!(aggregate_status(&msg(&["s"], &["a"]), &p), DeliveryStatus::PartiallyDelivered);
        assert_eq!(aggregate_status(&msg(&["s"], &["a", "b"]), &p), DeliveryStatus::Delivered);
        assert_eq!(aggregate_status(&msg(&["s", "a"], &["a", "b"]), &p), DeliveryStatus::PartiallyRead);
        assert_eq!(aggregate_status(&msg(&["s", "a", "b"], &[]), &p), DeliveryStatus::Read);
    }

    #[test]
    fn reader_counts_as_delivered() {
        let p = participants();
        // a read without an explicit delivery receipt, b delivered.
        assert_eq!(aggregate_status(&msg(&["a"], &["b"]), &p), DeliveryStatus::PartiallyRead);
        assert_eq!(aggregate_status(&msg(&[], &["b"]), &p), DeliveryStatus::PartiallyDelivered);
    }

    #[test]
    fn non_participants_are_ignored() {
        let p = participants();
        assert_eq!(aggregate_status(&msg(&["x", "y"], &["z"]), &p), DeliveryStatus::Sent);
    }

    #[test]
    fn chat_with_only_the_sender_stays_sent() {
        let p = vec!["s".to_string()];
        assert_eq!(aggregate_status(&msg(&["s"], &["s"]), &p), DeliveryStatus::Sent);
    }

    #[test]
    fn status_serializes_camel_case() {
        let json = serde_json::to_value(DeliveryStatus::PartiallyRead).unwrap();
        assert_eq!(json, "partiallyRead");
    }
}
