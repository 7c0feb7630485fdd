//! Ephemeral event relay: typing indicators and new-message announcements.
//!
//! Relayed payloads are forwarded as the client sent them. Only the fields
//! needed for routing are interpreted.

use serde_json::Value;

use crate::error::ApiError;
use crate::models::chat::Chat;
use crate::AppState;

use super::events::{EventName, NewMessagePayload, TypingPayload};
use super::fanout::{Audience, BroadcastPayload};
use super::reconcile::load_chat_for;
use super::session::ConnectionSession;

/// Relay `typing`/`stopTyping` to the room, skipping the sending
/// connection. The sender must have joined the room on this connection.
pub fn relay_typing(
    state: &AppState,
    session: &ConnectionSession,
    event_name: &str,
    payload: TypingPayload,
    data: Value,
) -> Result<(), ApiError> {
    if !state
        .rooms
        .connection_in_room(&session.connection_id, &payload.chat_id)
    {
        return Err(ApiError::forbidden("Join the chat before sending typing events"));
    }

    state.broadcast.dispatch(
        BroadcastPayload::to_room(&payload.chat_id, event_name, data)
            .excluding(&session.connection_id),
    );
    Ok(())
}

/// Relay `newMessage` as `messageRecieved` to the room, skipping the sending
/// connection. Online participants that are not viewing the room get a
/// user-addressed copy. Returns the chat so the caller can dispatch pushes.
pub async fn relay_new_message(
    state: &AppState,
    session: &ConnectionSession,
    actor: &str,
    payload: NewMessagePayload,
    data: Value,
) -> Result<Chat, ApiError> {
    if payload.sender_id != actor {
        return Err(ApiError::unauthorized("senderId does not match this connection"));
    }
    let chat = load_chat_for(state, &payload.chat_id, actor).await?;

    state.broadcast.dispatch(
        BroadcastPayload::to_room(&chat.id, EventName::MESSAGE_RECEIVED, data.clone())
            .excluding(&session.connection_id),
    );

    let mut direct = 0usize;
    for participant in chat.users.iter().filter(|u| u.as_str() != actor) {
        if state.rooms.user_in_room(participant, &chat.id) || !state.connections.is_online(participant) {
            continue;
        }
        state.broadcast.dispatch(BroadcastPayload::new(
            Audience::User(participant.clone()),
            EventName::MESSAGE_RECEIVED,
            data.clone(),
        ));
        direct += 1;
    }

    tracing::debug!(chat_id = %chat.id, sender_id = %actor, direct, "new message relayed");
    Ok(chat)
}
