//! Inbound event dispatch.
//!
//! Every client event is handled to completion before the next one on the
//! same connection. A rejected event produces an `error` event on that
//! connection and never closes the socket.

use chrono::{DateTime, Utc};

use crate::auth::tokens;
use crate::error::ApiError;
use crate::AppState;

use super::events::{
    ClientMessage, DeletedForEveryonePayload, EventName, GatewayMessage, HeartbeatPayload,
    JoinChatPayload, LeaveChatPayload, MessageDeliveredPayload, MessageReadPayload,
    NewMessagePayload, PresencePayload, SetupPayload,
};
use super::fanout::{Audience, BroadcastPayload};
use super::session::ConnectionSession;
use super::{notify, reconcile, relay};

/// Handle one client event. Returns the direct reply for this connection,
/// if the event has one.
pub async fn handle_client_message(
    state: &AppState,
    session: &mut ConnectionSession,
    msg: ClientMessage,
) -> Option<GatewayMessage> {
    match dispatch_event(state, session, &msg).await {
        Ok(reply) => reply,
        Err(err) => {
            if err.status.is_server_error() {
                tracing::error!(
                    connection_id = %session.connection_id,
                    event = %msg.event,
                    %err,
                    "event failed"
                );
            } else {
                tracing::warn!(
                    connection_id = %session.connection_id,
                    event = %msg.event,
                    %err,
                    "event rejected"
                );
            }
            Some(error_reply(&msg, &err))
        }
    }
}

fn error_reply(msg: &ClientMessage, err: &ApiError) -> GatewayMessage {
    if msg.event == EventName::JOIN_CHAT && err.is_not_found() {
        return GatewayMessage::new(
            EventName::CHAT_DELETED_ERROR,
            serde_json::json!({
                "chatId": msg.data.get("chatId").cloned().unwrap_or_default(),
                "message": err.message,
            }),
        );
    }
    GatewayMessage::error(&msg.event, err)
}

async fn dispatch_event(
    state: &AppState,
    session: &mut ConnectionSession,
    msg: &ClientMessage,
) -> Result<Option<GatewayMessage>, ApiError> {
    match msg.event.as_str() {
        EventName::SETUP => handle_setup(state, session, msg.payload()?).await.map(Some),
        EventName::HEARTBEAT => {
            let hb: HeartbeatPayload = msg.payload()?;
            Ok(Some(GatewayMessage::heartbeat_ack(hb.seq)))
        }
        EventName::JOIN_CHAT => handle_join(state, session, msg.payload()?).await.map(Some),
        EventName::LEAVE_CHAT => handle_leave(state, session, msg.payload()?).map(Some),
        EventName::TYPING | EventName::STOP_TYPING => {
            require_identity(session)?;
            relay::relay_typing(state, session, &msg.event, msg.payload()?, msg.data.clone())?;
            Ok(None)
        }
        EventName::NEW_MESSAGE => {
            let actor = require_identity(session)?.to_string();
            let payload: NewMessagePayload = msg.payload()?;
            let chat =
                relay::relay_new_message(state, session, &actor, payload, msg.data.clone()).await?;

            let state = state.clone();
            tokio::spawn(async move {
                notify::dispatch_new_message(&state, &chat, &actor).await;
            });
            Ok(None)
        }
        EventName::MESSAGE_DELIVERED => {
            let actor = require_identity(session)?;
            let payload: MessageDeliveredPayload = msg.payload()?;
            reconcile::mark_delivered(state, actor, payload).await?;
            Ok(None)
        }
        EventName::MESSAGE_READ => {
            let actor = require_identity(session)?;
            let payload: MessageReadPayload = msg.payload()?;
            reconcile::mark_read(state, actor, payload).await?;
            Ok(None)
        }
        EventName::MESSAGE_DELETED_FOR_EVERYONE => {
            require_identity(session)?;
            let payload: DeletedForEveryonePayload = msg.payload()?;
            reconcile::mark_deleted_for_everyone(state, payload);
            Ok(None)
        }
        EventName::SET_ONLINE => {
            handle_set_online(state, session, msg.payload()?)?;
            Ok(None)
        }
        EventName::SET_OFFLINE => {
            handle_set_offline(state, session, msg.payload()?)?;
            Ok(None)
        }
        other => Err(ApiError::bad_request(format!("Unknown event: {other}"))),
    }
}

fn require_identity(session: &ConnectionSession) -> Result<&str, ApiError> {
    session
        .user_id
        .as_deref()
        .ok_or_else(|| ApiError::unauthorized("Send setup before other events"))
}

fn require_same_user<'a>(session: &'a ConnectionSession, user_id: &str) -> Result<&'a str, ApiError> {
    let actor = require_identity(session)?;
    if actor != user_id {
        return Err(ApiError::unauthorized("userId does not match this connection"));
    }
    Ok(actor)
}

async fn handle_setup(
    state: &AppState,
    session: &mut ConnectionSession,
    payload: SetupPayload,
) -> Result<GatewayMessage, ApiError> {
    if let Some(secret) = state.config.jwt_secret.as_deref() {
        let token = payload
            .token
            .as_deref()
            .ok_or_else(|| ApiError::unauthorized("Missing token"))?;
        let claims = tokens::verify_access_token(secret, token)?;
        if claims.user_id != payload.user_id {
            return Err(ApiError::unauthorized("Token does not match userId"));
        }
    }

    if let Some(bound) = session.user_id.as_deref() {
        if bound != payload.user_id {
            return Err(ApiError::conflict("Connection is already bound to another user"));
        }
    }

    if state.store.find_user(&payload.user_id).await?.is_none() {
        return Err(ApiError::not_found("Unknown user"));
    }

    session.user_id = Some(payload.user_id.clone());
    let went_online = state
        .connections
        .register_connection(&payload.user_id, &session.connection_id);
    if went_online {
        state.broadcast.dispatch(BroadcastPayload::new(
            Audience::Everyone,
            EventName::USER_ONLINE,
            serde_json::json!({ "userId": payload.user_id }),
        ));
    }

    tracing::info!(
        connection_id = %session.connection_id,
        user_id = %payload.user_id,
        went_online,
        "connection set up"
    );

    Ok(GatewayMessage::new(
        EventName::CONNECTED,
        serde_json::json!({
            "userId": payload.user_id,
            "onlineUsers": state.connections.online_users(),
        }),
    ))
}

async fn handle_join(
    state: &AppState,
    session: &ConnectionSession,
    payload: JoinChatPayload,
) -> Result<GatewayMessage, ApiError> {
    let actor = match payload.user_id.as_deref() {
        Some(user_id) => require_same_user(session, user_id)?,
        None => require_identity(session)?,
    };
    let chat = reconcile::load_chat_for(state, &payload.chat_id, actor).await?;

    state.rooms.join(actor, &chat.id, &session.connection_id);

    // The join stands even if catch-up fails; the next join retries it.
    let caught_up = match reconcile::catch_up(state, &chat, actor).await {
        Ok(n) => n,
        Err(err) => {
            tracing::warn!(chat_id = %chat.id, user_id = %actor, %err, "catch-up read failed");
            0
        }
    };

    tracing::debug!(
        connection_id = %session.connection_id,
        chat_id = %chat.id,
        caught_up,
        "joined chat"
    );

    Ok(GatewayMessage::new(
        EventName::JOINED,
        serde_json::json!({ "userId": actor, "chatId": chat.id }),
    ))
}

fn handle_leave(
    state: &AppState,
    session: &ConnectionSession,
    payload: LeaveChatPayload,
) -> Result<GatewayMessage, ApiError> {
    require_identity(session)?;
    state.rooms.leave(&payload.chat_id, &session.connection_id);
    Ok(GatewayMessage::new(
        EventName::LEFT,
        serde_json::json!({ "chatId": payload.chat_id }),
    ))
}

fn handle_set_online(
    state: &AppState,
    session: &ConnectionSession,
    payload: PresencePayload,
) -> Result<(), ApiError> {
    let actor = require_same_user(session, &payload.user_id)?;
    if state.connections.set_online(actor) {
        state.broadcast.dispatch(BroadcastPayload::new(
            Audience::Everyone,
            EventName::USER_ONLINE,
            serde_json::json!({ "userId": actor }),
        ));
    }
    Ok(())
}

fn handle_set_offline(
    state: &AppState,
    session: &ConnectionSession,
    payload: PresencePayload,
) -> Result<(), ApiError> {
    let actor = require_same_user(session, &payload.user_id)?;
    if let Some(last_seen) = state.connections.set_offline(actor) {
        announce_offline(state, actor, last_seen);
    }
    Ok(())
}

/// Tear down a closed connection: drop its room memberships, deregister it,
/// and record last-seen if it was the user's last connection. The offline
/// announcement is skipped when the user already went offline explicitly.
pub fn handle_disconnect(state: &AppState, session: &ConnectionSession) {
    let rooms = state.rooms.clear_connection(&session.connection_id);
    let Some(user_id) = session.user_id.as_deref() else {
        return;
    };

    if let Some(last) = state
        .connections
        .deregister_connection(user_id, &session.connection_id)
    {
        if last.went_offline {
            announce_offline(state, user_id, last.last_seen);
        } else {
            persist_last_seen(state, user_id, last.last_seen);
        }
    }

    tracing::debug!(
        connection_id = %session.connection_id,
        %user_id,
        rooms = rooms.len(),
        "connection cleaned up"
    );
}

fn announce_offline(state: &AppState, user_id: &str, last_seen: DateTime<Utc>) {
    state.broadcast.dispatch(BroadcastPayload::new(
        Audience::Everyone,
        EventName::USER_OFFLINE,
        serde_json::json!({ "userId": user_id, "lastSeen": last_seen }),
    ));
    persist_last_seen(state, user_id, last_seen);
}

fn persist_last_seen(state: &AppState, user_id: &str, last_seen: DateTime<Utc>) {
    let store = state.store.clone();
    let user_id = user_id.to_string();
    tokio::spawn(async move {
        if let Err(err) = store.record_last_seen(&user_id, last_seen).await {
            tracing::warn!(%user_id, %err, "failed to persist last seen");
        }
    });
}
