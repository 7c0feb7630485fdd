//! Message delivery status endpoint.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::gateway::reconcile::{aggregate_status, load_chat_for, DeliveryStatus};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/messages/{message_id}/status", get(get_message_status))
}

// ---------------------------------------------------------------------------
// GET /api/v1/messages/{message_id}/status
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatusResponse {
    pub message_id: String,
    pub chat_id: String,
    pub status: DeliveryStatus,
    pub delivered_to: Vec<String>,
    pub read_by: Vec<String>,
    pub participant_count: usize,
}

#[utoipa::path(
    get,
    path = "/api/v1/messages/{message_id}/status",
    tag = "Messages",
    security(("bearer" = [])),
    params(
        ("message_id" = String, Path, description = "Message ID"),
    ),
    responses(
        (status = 200, description = "Aggregate delivery status", body = MessageStatusResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not a participant", body = ApiErrorBody),
        (status = 404, description = "Message not found", body = ApiErrorBody),
    ),
)]
pub async fn get_message_status(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Result<Json<MessageStatusResponse>, ApiError> {
    let message = state
        .store
        .find_message(&message_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;
    let chat = load_chat_for(&state, &message.chat_id, &user_id).await?;

    Ok(Json(MessageStatusResponse {
        status: aggregate_status(&message, &chat.users),
        participant_count: chat.users.len(),
        message_id: message.id,
        chat_id: message.chat_id,
        delivered_to: message.delivered_to,
        read_by: message.read_by,
    }))
}
