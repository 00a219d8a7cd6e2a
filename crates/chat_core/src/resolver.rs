use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use shared::domain::{ChannelId, ParticipantId};
use storage::NewChannel;
use tracing::{debug, info};

use crate::{channel_summary, ChatContext, ChatError, ParticipantDirectory, ProfileLookup};

const CHANNEL_KEY_PREFIX: &str = "dm_";

/// Channel id for the one-to-one conversation between `a` and `b`. The same
/// pair yields the same id regardless of argument order.
pub fn channel_key(a: &ParticipantId, b: &ParticipantId) -> ChannelId {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Sha256::new();
    for id in [lo, hi] {
        hasher.update((id.as_str().len() as u64).to_be_bytes());
        hasher.update(id.as_str().as_bytes());
    }
    ChannelId(format!(
        "{CHANNEL_KEY_PREFIX}{}",
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    ))
}

/// Finds or creates the one-to-one channel between the directory's
/// participant and `peer_id`.
///
/// A known `existing` id is trusted without a round trip. Otherwise the
/// deterministic key is checked first, then channels created before keys
/// were deterministic, and finally the keyed channel is created with a
/// create-if-absent write so concurrent first contacts converge on one
/// channel.
pub async fn resolve_channel<P: ProfileLookup>(
    ctx: &ChatContext,
    directory: &mut ParticipantDirectory<P>,
    peer_id: &ParticipantId,
    existing: Option<ChannelId>,
) -> Result<ChannelId, ChatError> {
    if let Some(channel_id) = existing.filter(|id| !id.is_blank()) {
        return Ok(channel_id);
    }

    let self_id = directory.self_id().clone();
    if self_id.is_blank() || peer_id.is_blank() {
        return Err(ChatError::MissingParticipant);
    }
    if &self_id == peer_id {
        return Err(ChatError::SelfConversation);
    }

    let key = channel_key(&self_id, peer_id);
    if ctx
        .storage
        .load_channel(&key)
        .await
        .map_err(ChatError::Lookup)?
        .is_some()
    {
        debug!(channel_id = %key, "reusing keyed channel");
        return Ok(key);
    }

    let legacy = ctx
        .storage
        .list_channels_for_participant(&self_id)
        .await
        .map_err(ChatError::Lookup)?
        .into_iter()
        .map(channel_summary)
        .find(|channel| channel.has_exact_participants(&self_id, peer_id));
    if let Some(channel) = legacy {
        debug!(channel_id = %channel.channel_id, "reusing existing one-to-one channel");
        return Ok(channel.channel_id);
    }

    let self_name = directory.resolve_name(&self_id).await;
    let peer_name = directory.resolve_name(peer_id).await;
    let created = ctx
        .storage
        .create_channel_if_absent(&NewChannel {
            channel_id: key.clone(),
            participants: vec![(self_id.clone(), self_name), (peer_id.clone(), peer_name)],
            last_message: ctx.settings.greeting.clone(),
            is_group_chat: false,
        })
        .await
        .map_err(ChatError::CreateChannel)?;

    if created {
        info!(channel_id = %key, %self_id, %peer_id, "created chat channel");
    } else {
        debug!(channel_id = %key, "channel was created concurrently; reusing it");
    }
    Ok(key)
}

#[cfg(test)]
#[path = "tests/resolver_tests.rs"]
mod tests;
