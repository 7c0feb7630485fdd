//! Push-notification gate for new messages.
//!
//! A participant is pushed only when none of their connections is viewing
//! the room. Sends run concurrently and each failure is recorded and logged
//! on its own; nothing here is ever reported back to the sender.

use futures_util::future::join_all;

use crate::error::ApiError;
use crate::models::chat::Chat;
use crate::models::user::User;
use crate::push::PushData;
use crate::AppState;

/// Outcome of one notification pass.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Participants skipped because they are viewing the room.
    pub skipped: Vec<String>,
    /// Participants a push was delivered for.
    pub sent: Vec<String>,
    /// `(user_id, reason)` for every failed attempt.
    pub failed: Vec<(String, String)>,
}

impl DispatchReport {
    pub fn attempted(&self) -> usize {
        self.sent.len() + self.failed.len()
    }
}

/// Push a new-message notification to every participant of `chat` other
/// than the sender who has not joined the room.
pub async fn dispatch_new_message(state: &AppState, chat: &Chat, sender_id: &str) -> DispatchReport {
    let mut report = DispatchReport::default();

    let sender = match state.store.find_user(sender_id).await {
        Ok(user) => user,
        Err(err) => {
            tracing::warn!(%sender_id, %err, "sender lookup failed, pushing without profile");
            None
        }
    };

    let mut targets = Vec::new();
    for participant in chat.users.iter().filter(|u| u.as_str() != sender_id) {
        if state.rooms.user_in_room(participant, &chat.id) {
            report.skipped.push(participant.clone());
        } else {
            targets.push(participant.clone());
        }
    }

    let results = join_all(
        targets
            .iter()
            .map(|recipient| notify_one(state, chat, sender_id, sender.as_ref(), recipient)),
    )
    .await;

    for (recipient, result) in targets.into_iter().zip(results) {
        match result {
            Ok(()) => report.sent.push(recipient),
            Err(err) => {
                tracing::warn!(chat_id = %chat.id, user_id = %recipient, %err, "push notification failed");
                report.failed.push((recipient, err.message));
            }
        }
    }

    tracing::info!(
        chat_id = %chat.id,
        %sender_id,
        sent = report.sent.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        "new message notifications dispatched"
    );
    report
}

async fn notify_one(
    state: &AppState,
    chat: &Chat,
    sender_id: &str,
    sender: Option<&User>,
    recipient: &str,
) -> Result<(), ApiError> {
    let user = state
        .store
        .find_user(recipient)
        .await?
        .ok_or_else(|| ApiError::not_found("Recipient not found"))?;
    let token = user
        .push_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::not_found("missing push token"))?;
    let unread = state.store.count_unread(&chat.id, recipient).await?;

    let sender_name = sender.map(User::display_name).unwrap_or_default().to_string();
    let group_name = match (&chat.chat_name, chat.is_group_chat) {
        (Some(name), true) => name.clone(),
        _ => sender_name.clone(),
    };
    let data = PushData {
        sender_name,
        room_id: chat.id.clone(),
        user_id: sender_id.to_string(),
        unread_messages: unread.to_string(),
        group_name,
        user_profile_url: sender.and_then(|s| s.profile_pic.clone()),
        group_photo_url: if chat.is_group_chat { chat.group_pic.clone() } else { None },
    };

    state.push.send(token, &data).await
}
