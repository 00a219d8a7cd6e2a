use shared::{
    domain::{ChannelId, ParticipantId},
    protocol::ChatMessage,
};
use storage::NewMessage;
use tracing::{info, warn};

use crate::{chat_message, ChatContext, ChatError};

/// Sends `text` to `channel_id`.
///
/// Input is validated before the store is touched. The message insert and
/// the channel summary update commit together or not at all, so the channel
/// list preview can never disagree with the newest message. Nothing is
/// retried; on error the caller keeps its input for a manual retry.
pub async fn send_message(
    ctx: &ChatContext,
    channel_id: &ChannelId,
    sender_id: &ParticipantId,
    sender_name: &str,
    text: &str,
) -> Result<ChatMessage, ChatError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ChatError::EmptyMessage);
    }
    if channel_id.is_blank() {
        return Err(ChatError::MissingChannel);
    }
    if sender_id.is_blank() {
        return Err(ChatError::MissingParticipant);
    }

    let stored = ctx
        .storage
        .commit_message(
            channel_id,
            &NewMessage {
                sender_id: sender_id.clone(),
                sender_name: sender_name.to_string(),
                message_text: text.to_string(),
            },
        )
        .await
        .map_err(|error| {
            warn!(%channel_id, %sender_id, error = %format!("{error:#}"), "message send failed");
            ChatError::Send(error)
        })?;

    info!(%channel_id, message_id = %stored.message_id, "message sent");
    Ok(chat_message(stored))
}
