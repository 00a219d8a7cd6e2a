//! Direct messaging between two participants over the chat store: channel
//! discovery, live message and channel-list subscriptions, and the atomic
//! send path.

use shared::{
    domain::ParticipantId,
    protocol::{ChannelSummary, ChatMessage, UNKNOWN_LABEL},
};
use storage::{Storage, StoredChannel, StoredMessage};

mod channel_list;
mod directory;
pub mod error;
mod message_stream;
mod resolver;
mod send;
mod session;
mod subscription;

pub use channel_list::subscribe_channel_list;
pub use directory::{ParticipantDirectory, ProfileLookup};
pub use error::ChatError;
pub use message_stream::attach_message_stream;
pub use resolver::{channel_key, resolve_channel};
pub use send::send_message;
pub use session::{ConversationSession, ConversationTarget};
pub use subscription::SubscriptionHandle;

pub const DEFAULT_SELF_NAME: &str = "You";
pub const DEFAULT_GREETING: &str = "Say hello!";

#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Name used for the current participant when their profile has none.
    pub self_fallback_name: String,
    /// Label used for any other participant whose name cannot be resolved.
    pub unknown_name_label: String,
    /// Summary text of a freshly created channel.
    pub greeting: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            self_fallback_name: DEFAULT_SELF_NAME.into(),
            unknown_name_label: UNKNOWN_LABEL.into(),
            greeting: DEFAULT_GREETING.into(),
        }
    }
}

#[derive(Clone)]
pub struct ChatContext {
    pub storage: Storage,
    pub settings: ChatSettings,
}

impl ChatContext {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            settings: ChatSettings::default(),
        }
    }

    pub fn directory_for(&self, self_id: ParticipantId) -> ParticipantDirectory<Storage> {
        ParticipantDirectory::new(self.storage.clone(), self_id, &self.settings)
    }
}

fn channel_summary(channel: StoredChannel) -> ChannelSummary {
    ChannelSummary {
        channel_id: channel.channel_id,
        participant_ids: channel.participant_ids,
        participant_names: channel
            .participant_names
            .into_iter()
            .map(|(id, name)| {
                let name = name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_LABEL.to_string());
                (id, name)
            })
            .collect(),
        last_message: channel.last_message.unwrap_or_default(),
        last_message_at: channel.last_message_at,
        is_group_chat: channel.is_group_chat,
    }
}

fn chat_message(message: StoredMessage) -> ChatMessage {
    ChatMessage {
        message_id: message.message_id,
        channel_id: message.channel_id,
        sender_id: message.sender_id,
        sender_name: message
            .sender_name
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
        message_text: message.message_text,
        sent_at: message.sent_at,
        read: message.read,
    }
}
