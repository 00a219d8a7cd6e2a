use shared::{domain::ChannelId, protocol::ChatMessage};
use storage::StoreChange;

use crate::{chat_message, subscription::spawn_snapshot_subscription, ChatContext, ChatError, SubscriptionHandle};

/// Attaches to the live, ascending message sequence of `channel_id`.
///
/// Every change re-delivers the whole sequence; consumers replace their view
/// state wholesale. That keeps delivery trivially consistent at the message
/// volumes of a one-to-one chat; an incremental delta feed is the upgrade path
/// if channels grow long. The stream never ends on its own: call
/// [`SubscriptionHandle::detach`] when the screen goes away. A store error is
/// reported once through `on_error` and ends the subscription.
pub fn attach_message_stream<U, E>(
    ctx: &ChatContext,
    channel_id: ChannelId,
    on_update: U,
    on_error: E,
) -> Result<SubscriptionHandle, ChatError>
where
    U: FnMut(Vec<ChatMessage>) + Send + 'static,
    E: FnOnce(ChatError) + Send + 'static,
{
    if channel_id.is_blank() {
        return Err(ChatError::MissingChannel);
    }

    let watched = channel_id.clone();
    Ok(spawn_snapshot_subscription(
        "message_stream",
        ctx.storage.clone(),
        move |change| {
            matches!(change, StoreChange::MessageAppended { channel_id, .. } if *channel_id == watched)
        },
        move |storage| {
            let channel_id = channel_id.clone();
            async move {
                let messages = storage.list_channel_messages(&channel_id).await?;
                Ok::<_, anyhow::Error>(messages.into_iter().map(chat_message).collect::<Vec<_>>())
            }
        },
        on_update,
        on_error,
    ))
}

#[cfg(test)]
#[path = "tests/message_stream_tests.rs"]
mod tests;
