use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use shared::domain::ParticipantId;
use storage::Storage;
use tracing::{debug, warn};

use crate::ChatSettings;

/// Source of stored profile names.
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn display_name(&self, participant_id: &ParticipantId) -> Result<Option<String>>;
}

#[async_trait]
impl ProfileLookup for Storage {
    async fn display_name(&self, participant_id: &ParticipantId) -> Result<Option<String>> {
        self.participant_name(participant_id).await
    }
}

/// Session-scoped cache of display names for the current participant and
/// whoever they are talking to. Never fails: unresolvable names become the
/// configured fallback and the failure is logged.
pub struct ParticipantDirectory<P> {
    profiles: P,
    self_id: ParticipantId,
    self_fallback: String,
    unknown_label: String,
    names: HashMap<ParticipantId, String>,
}

impl<P: ProfileLookup> ParticipantDirectory<P> {
    pub fn new(profiles: P, self_id: ParticipantId, settings: &ChatSettings) -> Self {
        Self {
            profiles,
            self_id,
            self_fallback: settings.self_fallback_name.clone(),
            unknown_label: settings.unknown_name_label.clone(),
            names: HashMap::new(),
        }
    }

    pub fn self_id(&self) -> &ParticipantId {
        &self.self_id
    }

    /// Records a name the caller already has (typically from a list screen).
    /// An entry that is already cached wins.
    pub fn remember(&mut self, participant_id: ParticipantId, name: impl Into<String>) {
        let name = name.into();
        if name.trim().is_empty() {
            return;
        }
        self.names.entry(participant_id).or_insert(name);
    }

    pub fn cached(&self, participant_id: &ParticipantId) -> Option<&str> {
        self.names.get(participant_id).map(String::as_str)
    }

    pub async fn resolve_name(&mut self, participant_id: &ParticipantId) -> String {
        if let Some(name) = self.names.get(participant_id) {
            return name.clone();
        }

        let fallback = if participant_id == &self.self_id {
            &self.self_fallback
        } else {
            &self.unknown_label
        };

        let name = match self.profiles.display_name(participant_id).await {
            Ok(Some(name)) if !name.trim().is_empty() => {
                debug!(%participant_id, "resolved participant name from profile");
                name
            }
            Ok(_) => {
                warn!(%participant_id, %fallback, "participant profile has no name; using fallback");
                fallback.clone()
            }
            Err(error) => {
                warn!(%participant_id, %fallback, error = %format!("{error:#}"), "participant profile lookup failed; using fallback");
                fallback.clone()
            }
        };

        self.names.insert(participant_id.clone(), name.clone());
        name
    }
}
