use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ChannelId, MessageId, ParticipantId};

/// Label shown when a participant name or channel field is missing.
pub const UNKNOWN_LABEL: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub channel_id: ChannelId,
    pub participant_ids: BTreeSet<ParticipantId>,
    /// Names captured when the channel was created; not kept in sync with
    /// later profile edits.
    pub participant_names: BTreeMap<ParticipantId, String>,
    pub last_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    pub is_group_chat: bool,
}

impl ChannelSummary {
    pub fn is_one_to_one(&self) -> bool {
        !self.is_group_chat && self.participant_ids.len() == 2
    }

    pub fn has_exact_participants(&self, a: &ParticipantId, b: &ParticipantId) -> bool {
        self.is_one_to_one() && self.participant_ids.contains(a) && self.participant_ids.contains(b)
    }

    pub fn other_participant_id(&self, self_id: &ParticipantId) -> Option<&ParticipantId> {
        if !self.is_one_to_one() {
            return None;
        }
        self.participant_ids.iter().find(|id| *id != self_id)
    }

    pub fn other_participant_name(&self, self_id: &ParticipantId) -> Option<&str> {
        let other = self.other_participant_id(self_id)?;
        self.participant_names.get(other).map(String::as_str)
    }

    pub fn display_title(&self, self_id: &ParticipantId) -> &str {
        self.other_participant_name(self_id)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(UNKNOWN_LABEL)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub sender_id: ParticipantId,
    pub sender_name: String,
    pub message_text: String,
    pub sent_at: DateTime<Utc>,
    /// Stored but never flipped; unread tracking does not exist yet.
    pub read: bool,
}

impl ChatMessage {
    pub fn is_sent_by(&self, participant_id: &ParticipantId) -> bool {
        &self.sender_id == participant_id
    }

    pub fn time_label(&self) -> String {
        self.sent_at.format("%I:%M %p").to_string()
    }
}
