#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::time::Duration;

use axum::Router;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::{tungstenite, MaybeTlsStream, WebSocketStream};

use chat_api::auth::tokens::AccessClaims;
use chat_api::config::{Config, DEFAULT_FCM_ENDPOINT};
use chat_api::crypto::{AesGcmCipher, ContentCipher};
use chat_api::db::pool::{self, DbPool};
use chat_api::db::store::MemoryChatStore;
use chat_api::models::chat::Chat;
use chat_api::models::message::Message;
use chat_api::models::user::User;
use chat_api::push::MemoryPushSender;
use chat_api::AppState;
use chatter_common::id::{prefix, prefixed_ulid};

pub const TEST_JWT_SECRET: &str = "test-jwt-secret";
pub const TEST_SECRET_KEY: &str = "test-content-secret";

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// App state backed by in-memory store and push sender, plus handles to
/// both for seeding and inspection.
pub struct TestEnv {
    pub state: AppState,
    pub store: Arc<MemoryChatStore>,
    pub push: Arc<MemoryPushSender>,
}

pub fn test_config(jwt_secret: Option<&str>) -> Config {
    Config {
        database_url: "postgres://unused/chat_test".to_string(),
        secret_key: TEST_SECRET_KEY.to_string(),
        jwt_secret: jwt_secret.map(str::to_string),
        port: 0,
        cors_origin: None,
        fcm_server_key: None,
        fcm_endpoint: DEFAULT_FCM_ENDPOINT.to_string(),
        heartbeat_timeout_secs: 60,
    }
}

pub fn test_env_with(config: Config) -> TestEnv {
    let store = Arc::new(MemoryChatStore::new());
    let push = Arc::new(MemoryPushSender::new());
    let cipher = Arc::new(AesGcmCipher::from_secret(&config.secret_key));
    let state = AppState::new(config, store.clone(), cipher, push.clone());
    TestEnv { state, store, push }
}

/// Identities are trusted as sent (no JWT secret).
pub fn test_env() -> TestEnv {
    test_env_with(test_config(None))
}

/// Socket setup and REST routes require a signed token.
pub fn test_env_with_auth() -> TestEnv {
    test_env_with(test_config(Some(TEST_JWT_SECRET)))
}

pub fn test_app(env: &TestEnv) -> Router {
    chat_api::routes::router().with_state(env.state.clone())
}

/// Sign a day-long HS256 access token for `user_id` with the test secret.
pub fn issue_token(user_id: &str) -> String {
    let claims = AccessClaims {
        user_id: user_id.to_string(),
        role: "user".to_string(),
        exp: Utc::now().timestamp() + 24 * 3600,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("issue token")
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

static MIGRATE: Once = Once::new();

/// Pool for the `<db>_test` database next to `DATABASE_URL`, with the
/// schema migrated. Returns `None` (and says so) when no database is
/// configured, so suites without Postgres still run.
pub async fn test_db() -> Option<DbPool> {
    let env_path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(env_path);

    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping PostgreSQL test");
        return None;
    };
    let database_url = with_test_db_suffix(&database_url);

    MIGRATE.call_once(|| {
        let mut conn =
            PgConnection::establish(&database_url).expect("failed to connect to test database");
        conn.run_pending_migrations(MIGRATIONS)
            .expect("failed to run migrations");
    });

    Some(pool::connect(&database_url).await)
}

fn with_test_db_suffix(database_url: &str) -> String {
    let mut parts = database_url.splitn(2, '?');
    let base = parts.next().unwrap_or(database_url);
    let query = parts.next();

    let mut base_parts = base.rsplitn(2, '/');
    let db_name = base_parts.next().unwrap_or("");
    let prefix = base_parts.next().unwrap_or("");

    if db_name.is_empty() || db_name.ends_with("_test") {
        return database_url.to_string();
    }

    let mut updated = format!("{prefix}/{db_name}_test");
    if let Some(query) = query {
        updated.push('?');
        updated.push_str(query);
    }
    updated
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

pub fn seed_user(env: &TestEnv, name: &str, push_token: Option<&str>) -> String {
    let id = prefixed_ulid(prefix::USER);
    env.store.insert_user(User {
        id: id.clone(),
        name: Some(name.to_string()),
        profile_pic: None,
        push_token: push_token.map(str::to_string),
        last_seen_at: None,
        created_at: Utc::now(),
    });
    id
}

pub fn seed_chat(env: &TestEnv, users: &[&str], group_name: Option<&str>) -> String {
    let id = prefixed_ulid(prefix::CHAT);
    env.store.insert_chat(Chat {
        id: id.clone(),
        chat_name: group_name.map(str::to_string),
        is_group_chat: group_name.is_some(),
        group_pic: None,
        users: users.iter().map(|u| u.to_string()).collect(),
        created_at: Utc::now(),
    });
    id
}

/// Insert a message from `sender` whose body is `text` encrypted with the
/// test cipher. `age_secs` orders messages: larger is older.
pub fn seed_message(env: &TestEnv, chat_id: &str, sender: &str, text: &str, age_secs: i64) -> String {
    let id = prefixed_ulid(prefix::MESSAGE);
    let created_at: DateTime<Utc> = Utc::now() - chrono::Duration::seconds(age_secs);
    env.store.insert_message(Message {
        id: id.clone(),
        chat_id: chat_id.to_string(),
        sender_id: sender.to_string(),
        content: env.state.cipher.encrypt(text).expect("encrypt"),
        media: Vec::new(),
        read_by: vec![sender.to_string()],
        delivered_to: Vec::new(),
        deleted_for: Vec::new(),
        created_at,
    });
    id
}

// ---------------------------------------------------------------------------
// WebSocket helpers
// ---------------------------------------------------------------------------

/// Start an actual TCP server for WebSocket testing. The server runs in
/// the background.
pub async fn start_ws_server(env: &TestEnv) -> SocketAddr {
    let app = test_app(env);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

pub async fn connect(addr: SocketAddr) -> WsStream {
    let url = format!("ws://{addr}/socket");
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws
}

pub async fn send_event(ws: &mut WsStream, event: &str, data: serde_json::Value) {
    let msg = serde_json::json!({ "event": event, "data": data });
    ws.send(tungstenite::Message::Text(msg.to_string().into()))
        .await
        .expect("send event");
}

/// Read the next text frame as JSON.
pub async fn recv_event(ws: &mut WsStream) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for event")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            tungstenite::Message::Text(text) => {
                return serde_json::from_str(&text).expect("parse event");
            }
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Read events until one named `event` arrives, returning it.
pub async fn recv_until(ws: &mut WsStream, event: &str) -> serde_json::Value {
    loop {
        let msg = recv_event(ws).await;
        if msg["event"] == event {
            return msg;
        }
    }
}

/// Bind `user_id` to the connection and return the `connected` reply.
pub async fn setup(ws: &mut WsStream, user_id: &str) -> serde_json::Value {
    send_event(ws, "setup", serde_json::json!({ "userId": user_id })).await;
    recv_until(ws, "connected").await
}

/// Join a chat and return the `joined` reply.
pub async fn join(ws: &mut WsStream, user_id: &str, chat_id: &str) -> serde_json::Value {
    send_event(
        ws,
        "joinChat",
        serde_json::json!({ "userId": user_id, "chatId": chat_id }),
    )
    .await;
    recv_until(ws, "joined").await
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
