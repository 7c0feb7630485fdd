//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chatter_common::id::{prefix, prefixed_ulid};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::error::ApiError;
use crate::AppState;

use super::events::{ClientMessage, GatewayMessage};
use super::fanout::BroadcastPayload;
use super::handler::{handle_client_message, handle_disconnect};
use super::session::ConnectionSession;

/// Close code sent when the client stays silent past the liveness timeout.
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

type WsSink = SplitSink<WebSocket, Message>;

pub fn router() -> Router<AppState> {
    Router::new().route("/socket", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (ws_tx, ws_rx) = socket.split();
    let mut session = ConnectionSession::new(prefixed_ulid(prefix::CONNECTION));

    // Subscribe before reading anything so no event addressed to this
    // connection after setup can be missed.
    let broadcast_rx = state.broadcast.subscribe();

    tracing::info!(connection_id = %session.connection_id, "socket connected");

    run_session(&state, &mut session, ws_tx, ws_rx, broadcast_rx).await;

    handle_disconnect(&state, &session);

    tracing::info!(
        connection_id = %session.connection_id,
        user_id = ?session.user_id,
        "socket disconnected"
    );
}

/// Main event loop: handle client events in order, forward matching
/// broadcasts, and close silent connections.
async fn run_session(
    state: &AppState,
    session: &mut ConnectionSession,
    mut ws_tx: WsSink,
    mut ws_rx: SplitStream<WebSocket>,
    mut broadcast_rx: broadcast::Receiver<Arc<BroadcastPayload>>,
) {
    let liveness = Duration::from_secs(state.config.heartbeat_timeout_secs);
    let mut last_frame = Instant::now();

    loop {
        tokio::select! {
            // Client sends us a message.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_frame = Instant::now();
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => handle_client_message(state, session, client_msg).await,
                            Err(e) => Some(GatewayMessage::error(
                                "unknown",
                                &ApiError::bad_request(format!("Invalid JSON: {e}")),
                            )),
                        };
                        if let Some(reply) = reply {
                            if send_event(&mut ws_tx, session, reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        last_frame = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %session.connection_id, "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }

            // Broadcast event from the fanout hub.
            result = broadcast_rx.recv() => {
                match result {
                    Ok(payload) => {
                        if !session.should_receive(&payload, &state.rooms) {
                            continue;
                        }
                        let msg = GatewayMessage::new(&payload.event_name, payload.data.clone());
                        if send_event(&mut ws_tx, session, msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            connection_id = %session.connection_id,
                            skipped = n,
                            "connection lagged behind broadcast"
                        );
                        // Continue, dropping the missed events.
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }

            // No inbound frame within the liveness window.
            _ = time::sleep_until(last_frame + liveness) => {
                tracing::debug!(
                    connection_id = %session.connection_id,
                    "liveness timeout, closing connection"
                );
                let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Heartbeat timeout").await;
                break;
            }
        }
    }
}

/// Stamp the connection's next sequence number and write the event.
async fn send_event(
    ws_tx: &mut WsSink,
    session: &ConnectionSession,
    msg: GatewayMessage,
) -> Result<(), axum::Error> {
    let msg = msg.with_seq(session.next_seq());
    let json = match serde_json::to_string(&msg) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(?e, event = %msg.event, "failed to serialize gateway event");
            return Ok(());
        }
    };
    ws_tx.send(Message::Text(json.into())).await
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
