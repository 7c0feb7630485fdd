pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod push;
pub mod routes;

use std::sync::Arc;

use config::Config;
use crypto::ContentCipher;
use db::store::ChatStore;
use gateway::fanout::GatewayBroadcast;
use gateway::presence::ConnectionRegistry;
use gateway::rooms::RoomMembership;
use push::PushSender;

/// Shared application state available to all route and socket handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ChatStore>,
    pub cipher: Arc<dyn ContentCipher>,
    pub push: Arc<dyn PushSender>,
    pub broadcast: Arc<GatewayBroadcast>,
    pub connections: Arc<ConnectionRegistry>,
    pub rooms: Arc<RoomMembership>,
}

impl AppState {
    /// Build state with empty presence and membership registries.
    pub fn new(
        config: Config,
        store: Arc<dyn ChatStore>,
        cipher: Arc<dyn ContentCipher>,
        push: Arc<dyn PushSender>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            cipher,
            push,
            broadcast: Arc::new(GatewayBroadcast::new()),
            connections: Arc::new(ConnectionRegistry::new()),
            rooms: Arc::new(RoomMembership::new()),
        }
    }
}
