use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_api::config::Config;
use chat_api::crypto::{AesGcmCipher, ContentCipher};
use chat_api::db::pg_store::PgChatStore;
use chat_api::db::store::ChatStore;
use chat_api::push::{FcmPushSender, NoopPushSender, PushSender};
use chat_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    // Connect to PostgreSQL.
    let db = chat_api::db::pool::connect(&config.database_url).await;
    let store: Arc<dyn ChatStore> = Arc::new(PgChatStore::new(db));

    let cipher: Arc<dyn ContentCipher> = Arc::new(AesGcmCipher::from_secret(&config.secret_key));

    let push: Arc<dyn PushSender> = match config.fcm_server_key.as_deref() {
        Some(key) => Arc::new(FcmPushSender::new(config.fcm_endpoint.clone(), key)),
        None => {
            tracing::warn!("FCM_SERVER_KEY not set, push notifications will only be logged");
            Arc::new(NoopPushSender)
        }
    };

    if config.jwt_secret.is_none() {
        tracing::warn!("JWT_SECRET not set, socket identities are trusted as sent");
    }

    let cors = match config.cors_origin.as_deref().map(HeaderValue::from_str) {
        Some(Ok(origin)) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        Some(Err(e)) => {
            tracing::warn!(?e, "invalid CORS_ORIGIN, allowing any origin");
            CorsLayer::permissive()
        }
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    tracing::info!(
        heartbeat_timeout_secs = config.heartbeat_timeout_secs,
        "chat-api configured"
    );

    let state = AppState::new(config, store, cipher, push);

    let app = Router::new()
        .merge(chat_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "chat-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("chat-api shut down");
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
