use shared::{
    domain::{ChannelId, ParticipantId},
    protocol::ChatMessage,
};
use storage::Storage;
use tracing::debug;

use crate::{
    attach_message_stream, channel_summary, resolve_channel, send_message, ChatContext,
    ChatError, ParticipantDirectory, SubscriptionHandle,
};

/// What a conversation screen is opened with: a channel picked from the
/// conversation list, or a peer picked anywhere else, or both.
#[derive(Debug, Clone, Default)]
pub struct ConversationTarget {
    pub channel_id: Option<ChannelId>,
    pub peer_id: Option<ParticipantId>,
    pub peer_name: Option<String>,
    pub is_group_chat: bool,
}

impl ConversationTarget {
    pub fn channel(channel_id: ChannelId) -> Self {
        Self {
            channel_id: Some(channel_id),
            ..Self::default()
        }
    }

    pub fn peer(peer_id: ParticipantId, peer_name: impl Into<String>) -> Self {
        Self {
            peer_id: Some(peer_id),
            peer_name: Some(peer_name.into()),
            ..Self::default()
        }
    }
}

/// State owned by one open conversation screen.
pub struct ConversationSession {
    ctx: ChatContext,
    directory: ParticipantDirectory<Storage>,
    channel_id: ChannelId,
    peer_id: Option<ParticipantId>,
    is_group_chat: bool,
    stream: Option<SubscriptionHandle>,
}

impl ConversationSession {
    pub async fn open(
        ctx: &ChatContext,
        self_id: ParticipantId,
        target: ConversationTarget,
    ) -> Result<Self, ChatError> {
        let ConversationTarget {
            channel_id,
            peer_id,
            mut peer_name,
            mut is_group_chat,
        } = target;
        let channel_id = channel_id.filter(|id| !id.is_blank());
        let mut peer_id = peer_id.filter(|id| !id.is_blank());

        // Opened from a bare channel id: the peer comes from the channel itself.
        if let (Some(channel_id), true) = (&channel_id, peer_id.is_none()) {
            let stored = ctx
                .storage
                .load_channel(channel_id)
                .await
                .map_err(ChatError::Lookup)?
                .map(channel_summary);
            if let Some(channel) = stored {
                peer_id = channel.other_participant_id(&self_id).cloned();
                peer_name = channel.other_participant_name(&self_id).map(str::to_string);
                is_group_chat = channel.is_group_chat;
            }
        }

        let mut directory = ctx.directory_for(self_id.clone());
        directory.resolve_name(&self_id).await;
        if let (Some(peer), Some(name)) = (&peer_id, peer_name) {
            directory.remember(peer.clone(), name);
        }

        let channel_id = match (channel_id, &peer_id) {
            (Some(channel_id), _) => channel_id,
            (None, Some(peer)) => resolve_channel(ctx, &mut directory, peer, None).await?,
            (None, None) => return Err(ChatError::MissingChannel),
        };
        debug!(%channel_id, %self_id, "conversation opened");

        Ok(Self {
            ctx: ctx.clone(),
            directory,
            channel_id,
            peer_id,
            is_group_chat,
            stream: None,
        })
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    pub fn peer_id(&self) -> Option<&ParticipantId> {
        self.peer_id.as_ref()
    }

    pub fn is_group_chat(&self) -> bool {
        self.is_group_chat
    }

    pub fn title(&self) -> &str {
        self.peer_id
            .as_ref()
            .and_then(|peer| self.directory.cached(peer))
            .unwrap_or(self.ctx.settings.unknown_name_label.as_str())
    }

    pub fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    /// Starts delivering the channel's messages. An existing stream is
    /// detached first, so a screen coming back into view gets a fresh
    /// subscription seeded with the current full state.
    pub async fn attach<U, E>(&mut self, on_update: U, on_error: E) -> Result<(), ChatError>
    where
        U: FnMut(Vec<ChatMessage>) + Send + 'static,
        E: FnOnce(ChatError) + Send + 'static,
    {
        self.detach().await;
        let handle = attach_message_stream(&self.ctx, self.channel_id.clone(), on_update, on_error)?;
        self.stream = Some(handle);
        Ok(())
    }

    /// Must be called when the screen is hidden.
    pub async fn detach(&mut self) {
        if let Some(handle) = self.stream.take() {
            handle.detach().await;
        }
    }

    pub async fn send(&mut self, text: &str) -> Result<ChatMessage, ChatError> {
        let self_id = self.directory.self_id().clone();
        let sender_name = self.directory.resolve_name(&self_id).await;
        send_message(&self.ctx, &self.channel_id, &self_id, &sender_name, text).await
    }
}
