use shared::{domain::ParticipantId, protocol::ChannelSummary};
use storage::StoreChange;

use crate::{channel_summary, subscription::spawn_snapshot_subscription, ChatContext, ChatError, SubscriptionHandle};

/// Live list of every channel `self_id` takes part in, most recent first.
/// Same full-replace delivery and teardown rules as the message stream; it
/// is independent of any open conversation.
pub fn subscribe_channel_list<U, E>(
    ctx: &ChatContext,
    self_id: ParticipantId,
    on_update: U,
    on_error: E,
) -> Result<SubscriptionHandle, ChatError>
where
    U: FnMut(Vec<ChannelSummary>) + Send + 'static,
    E: FnOnce(ChatError) + Send + 'static,
{
    if self_id.is_blank() {
        return Err(ChatError::MissingParticipant);
    }

    let watched = self_id.clone();
    Ok(spawn_snapshot_subscription(
        "channel_list",
        ctx.storage.clone(),
        move |change| match change {
            StoreChange::ChannelWritten {
                participant_ids, ..
            } => participant_ids.contains(&watched),
            StoreChange::MessageAppended { .. } => false,
        },
        move |storage| {
            let self_id = self_id.clone();
            async move {
                let channels = storage.list_channels_for_participant(&self_id).await?;
                Ok::<_, anyhow::Error>(channels.into_iter().map(channel_summary).collect::<Vec<_>>())
            }
        },
        on_update,
        on_error,
    ))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use shared::domain::ChannelId;
    use storage::Storage;
    use tokio::{sync::mpsc, time::timeout};

    use super::*;
    use crate::{resolve_channel, send_message};

    fn pid(id: &str) -> ParticipantId {
        ParticipantId::from(id)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Vec<ChannelSummary>>) -> Vec<ChannelSummary> {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("snapshot in time")
            .expect("subscription alive")
    }

    #[tokio::test]
    async fn reorders_channels_when_a_message_is_sent() {
        let ctx = ChatContext::new(Storage::new("sqlite::memory:").await.expect("db"));
        let mut dir = ctx.directory_for(pid("u1"));
        dir.remember(pid("u2"), "Bob");
        dir.remember(pid("u3"), "Carol");
        let with_bob = resolve_channel(&ctx, &mut dir, &pid("u2"), None)
            .await
            .expect("bob channel");
        let with_carol = resolve_channel(&ctx, &mut dir, &pid("u3"), None)
            .await
            .expect("carol channel");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = subscribe_channel_list(
            &ctx,
            pid("u1"),
            move |channels| {
                let _ = tx.send(channels);
            },
            |_| {},
        )
        .expect("subscribe");

        let initial = next(&mut rx).await;
        let ids: Vec<&ChannelId> = initial.iter().map(|c| &c.channel_id).collect();
        assert_eq!(ids, [&with_carol, &with_bob]);

        send_message(&ctx, &with_bob, &pid("u1"), "Alice", "ping")
            .await
            .expect("send");

        let updated = next(&mut rx).await;
        assert_eq!(updated[0].channel_id, with_bob);
        assert_eq!(updated[0].last_message, "ping");
        assert_eq!(updated[0].display_title(&pid("u1")), "Bob");

        handle.detach().await;
    }

    #[tokio::test]
    async fn ignores_writes_to_other_participants_channels() {
        let ctx = ChatContext::new(Storage::new("sqlite::memory:").await.expect("db"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = subscribe_channel_list(
            &ctx,
            pid("u1"),
            move |channels| {
                let _ = tx.send(channels);
            },
            |_| {},
        )
        .expect("subscribe");
        assert!(next(&mut rx).await.is_empty());

        let mut other = ctx.directory_for(pid("u2"));
        resolve_channel(&ctx, &mut other, &pid("u3"), None)
            .await
            .expect("unrelated channel");

        assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());
        handle.detach().await;
    }

    #[tokio::test]
    async fn blank_participant_is_rejected() {
        let ctx = ChatContext::new(Storage::new("sqlite::memory:").await.expect("db"));
        let err = subscribe_channel_list(&ctx, pid(""), |_| {}, |_| {}).expect_err("blank");
        assert!(matches!(err, ChatError::MissingParticipant));
    }
}
