//! Push-notification senders.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::ApiError;

/// Data payload of a new-message push. Every value is sent as a string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushData {
    pub sender_name: String,
    pub room_id: String,
    /// The sender's user ID.
    pub user_id: String,
    pub unread_messages: String,
    pub group_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_profile_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_photo_url: Option<String>,
}

/// Sends a data payload to one device. Implementations make a single
/// attempt; callers decide what to do with a failure.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, token: &str, data: &PushData) -> Result<(), ApiError>;
}

// ---------------------------------------------------------------------------
// FCM (HTTP)
// ---------------------------------------------------------------------------

pub struct FcmPushSender {
    client: reqwest::Client,
    endpoint: String,
    server_key: String,
}

impl FcmPushSender {
    pub fn new(endpoint: impl Into<String>, server_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            server_key: server_key.into(),
        }
    }
}

#[async_trait]
impl PushSender for FcmPushSender {
    async fn send(&self, token: &str, data: &PushData) -> Result<(), ApiError> {
        let body = serde_json::json!({ "to": token, "data": data });
        let resp = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, format!("key={}", self.server_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::debug!(?e, "push request failed");
                ApiError::unavailable("Push provider unreachable")
            })?;

        if !resp.status().is_success() {
            return Err(ApiError::unavailable(format!(
                "Push provider returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// No-op (push not configured)
// ---------------------------------------------------------------------------

pub struct NoopPushSender;

#[async_trait]
impl PushSender for NoopPushSender {
    async fn send(&self, _token: &str, data: &PushData) -> Result<(), ApiError> {
        tracing::debug!(room_id = %data.room_id, "push not configured, skipping send");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory recorder (for tests)
// ---------------------------------------------------------------------------

/// Records every attempted send. Tokens registered with `fail_token` fail.
pub struct MemoryPushSender {
    sent: Mutex<Vec<(String, PushData)>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryPushSender {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_token(&self, token: &str) {
        self.failing.lock().insert(token.to_string());
    }

    /// Every attempt so far, including failed ones, as `(token, data)`.
    pub fn attempts(&self) -> Vec<(String, PushData)> {
        self.sent.lock().clone()
    }
}

impl Default for MemoryPushSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushSender for MemoryPushSender {
    async fn send(&self, token: &str, data: &PushData) -> Result<(), ApiError> {
        self.sent.lock().push((token.to_string(), data.clone()));
        if self.failing.lock().contains(token) {
            return Err(ApiError::unavailable("push rejected"));
        }
        Ok(())
    }
}
