mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::time;
use tokio_tungstenite::tungstenite;

use common::{recv_event, recv_until, send_event};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn setup_returns_connected_with_sequence() {
    let env = common::test_env();
    let user = common::seed_user(&env, "alice", None);
    let addr = common::start_ws_server(&env).await;

    let mut ws = common::connect(addr).await;
    send_event(&mut ws, "setup", json!({ "userId": user })).await;

    let connected = recv_event(&mut ws).await;
    assert_eq!(connected["event"], "connected");
    assert_eq!(connected["seq"], 1);
    assert_eq!(connected["data"]["userId"], user);
    assert_eq!(connected["data"]["onlineUsers"], json!([user]));

    // The user's own online transition follows.
    let online = recv_event(&mut ws).await;
    assert_eq!(online["event"], "userOnline");
    assert_eq!(online["seq"], 2);
}

#[tokio::test]
async fn heartbeat_is_acknowledged() {
    let env = common::test_env();
    let addr = common::start_ws_server(&env).await;
    let mut ws = common::connect(addr).await;

    send_event(&mut ws, "heartbeat", json!({ "seq": 42 })).await;
    let ack = recv_event(&mut ws).await;
    assert_eq!(ack["event"], "heartbeatAck");
    assert_eq!(ack["data"]["ack"], 42);
}

#[tokio::test]
async fn invalid_frames_produce_error_events_without_closing() {
    let env = common::test_env();
    let addr = common::start_ws_server(&env).await;
    let mut ws = common::connect(addr).await;

    ws.send(tungstenite::Message::Text("not json".into()))
        .await
        .expect("send");
    let err = recv_event(&mut ws).await;
    assert_eq!(err["event"], "error");
    assert_eq!(err["data"]["code"], "BAD_REQUEST");

    send_event(&mut ws, "joinChat", json!({ "chatId": "chat_x" })).await;
    let err = recv_event(&mut ws).await;
    assert_eq!(err["data"]["code"], "UNAUTHORIZED");

    // Socket is still usable.
    send_event(&mut ws, "heartbeat", json!({})).await;
    assert_eq!(recv_event(&mut ws).await["event"], "heartbeatAck");
}

#[tokio::test]
async fn typing_reaches_peers_but_not_the_sender() {
    let env = common::test_env();
    let alice = common::seed_user(&env, "alice", None);
    let bob = common::seed_user(&env, "bob", None);
    let chat = common::seed_chat(&env, &[&alice, &bob], None);
    let addr = common::start_ws_server(&env).await;

    let mut a = common::connect(addr).await;
    let mut b = common::connect(addr).await;
    common::setup(&mut a, &alice).await;
    common::setup(&mut b, &bob).await;
    common::join(&mut a, &alice, &chat).await;
    common::join(&mut b, &bob, &chat).await;

    send_event(&mut a, "typing", json!({ "chatId": chat })).await;
    let typing = recv_until(&mut b, "typing").await;
    assert_eq!(typing["data"]["chatId"], chat);

    // Alice's next frame is the heartbeat ack, never her own typing event.
    send_event(&mut a, "heartbeat", json!({ "seq": 1 })).await;
    loop {
        let msg = recv_event(&mut a).await;
        assert_ne!(msg["event"], "typing");
        if msg["event"] == "heartbeatAck" {
            break;
        }
    }
}

#[tokio::test]
async fn read_confirmation_reaches_the_reader_and_the_sender() {
    let env = common::test_env();
    let alice = common::seed_user(&env, "alice", None);
    let bob = common::seed_user(&env, "bob", None);
    let chat = common::seed_chat(&env, &[&alice, &bob], None);
    let addr = common::start_ws_server(&env).await;

    let mut a = common::connect(addr).await;
    let mut b = common::connect(addr).await;
    common::setup(&mut a, &alice).await;
    common::setup(&mut b, &bob).await;
    common::join(&mut a, &alice, &chat).await;
    common::join(&mut b, &bob, &chat).await;

    // Bob's message arrives after both joined, so no catch-up applies.
    let msg = common::seed_message(&env, &chat, &bob, "see you at 5", 0);
    send_event(
        &mut a,
        "messageRead",
        json!({ "messageId": msg, "chatId": chat, "readBy": [alice] }),
    )
    .await;

    for ws in [&mut a, &mut b] {
        let confirmation = recv_until(ws, "messageReadConfirmation").await;
        assert_eq!(confirmation["data"]["readBy"], json!([alice]));
        assert_eq!(confirmation["data"]["messages"][0]["id"], msg);
        assert_eq!(confirmation["data"]["messages"][0]["content"], "see you at 5");
        assert_eq!(confirmation["data"]["messages"][0]["status"], "read");
    }
}

#[tokio::test]
async fn join_catch_up_is_delivered_to_the_joiner() {
    let env = common::test_env();
    let alice = common::seed_user(&env, "alice", None);
    let bob = common::seed_user(&env, "bob", None);
    let chat = common::seed_chat(&env, &[&alice, &bob], None);
    for (i, text) in ["one", "two", "three"].iter().enumerate() {
        common::seed_message(&env, &chat, &bob, text, 30 - i as i64);
    }
    let addr = common::start_ws_server(&env).await;

    let mut a = common::connect(addr).await;
    common::setup(&mut a, &alice).await;
    common::join(&mut a, &alice, &chat).await;

    let confirmation = recv_until(&mut a, "messageReadConfirmation").await;
    assert_eq!(confirmation["data"]["messages"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn closing_the_last_socket_announces_offline() {
    let env = common::test_env();
    let alice = common::seed_user(&env, "alice", None);
    let bob = common::seed_user(&env, "bob", None);
    let addr = common::start_ws_server(&env).await;

    let mut watcher = common::connect(addr).await;
    common::setup(&mut watcher, &bob).await;

    let mut phone = common::connect(addr).await;
    let mut laptop = common::connect(addr).await;
    common::setup(&mut phone, &alice).await;
    common::setup(&mut laptop, &alice).await;
    // Skip the watcher's own announcement.
    loop {
        let online = recv_until(&mut watcher, "userOnline").await;
        if online["data"]["userId"] == alice {
            break;
        }
    }

    phone.close(None).await.expect("close phone");
    assert!(common::eventually(|| {
        env.state
            .connections
            .snapshot(&alice)
            .is_some_and(|s| s.connections == 1)
    })
    .await);

    laptop.close(None).await.expect("close laptop");
    let offline = recv_until(&mut watcher, "userOffline").await;
    assert_eq!(offline["data"]["userId"], alice);
    assert!(offline["data"]["lastSeen"].is_string());

    // Exactly one offline announcement.
    send_event(&mut watcher, "heartbeat", json!({ "seq": 9 })).await;
    loop {
        let msg = recv_event(&mut watcher).await;
        assert_ne!(msg["event"], "userOffline");
        if msg["event"] == "heartbeatAck" {
            break;
        }
    }
}

#[tokio::test]
async fn silent_connection_is_closed_after_liveness_timeout() {
    let mut config = common::test_config(None);
    config.heartbeat_timeout_secs = 1;
    let env = common::test_env_with(config);
    let addr = common::start_ws_server(&env).await;
    let mut ws = common::connect(addr).await;
    let started = time::Instant::now();

    let frame = time::timeout(Duration::from_secs(5), async {
        while let Some(msg) = ws.next().await {
            if let Ok(tungstenite::Message::Close(frame)) = msg {
                return frame;
            }
        }
        None
    })
    .await
    .expect("timeout waiting for close");
    let elapsed = started.elapsed();

    let frame = frame.expect("close frame");
    assert_eq!(u16::from(frame.code), 4009);
    assert!(
        elapsed < Duration::from_millis(1500),
        "closed after {elapsed:?} with a 1s timeout"
    );
}

#[tokio::test]
async fn each_frame_extends_the_liveness_window() {
    let mut config = common::test_config(None);
    config.heartbeat_timeout_secs = 1;
    let env = common::test_env_with(config);
    let addr = common::start_ws_server(&env).await;
    let mut ws = common::connect(addr).await;

    // Heartbeats every 600ms keep the socket open past two windows.
    for seq in 0..4 {
        time::sleep(Duration::from_millis(600)).await;
        send_event(&mut ws, "heartbeat", json!({ "seq": seq })).await;
        let ack = recv_event(&mut ws).await;
        assert_eq!(ack["event"], "heartbeatAck");
        assert_eq!(ack["data"]["ack"], seq);
    }
}
