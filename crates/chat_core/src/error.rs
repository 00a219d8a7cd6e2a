use shared::error::{ErrorCode, ErrorNotice};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("chat details missing: no channel or peer to talk to")]
    MissingChannel,
    #[error("participant id cannot be empty")]
    MissingParticipant,
    #[error("cannot open a one-to-one conversation with yourself")]
    SelfConversation,
    #[error("failed to find chat channel: {0:#}")]
    Lookup(#[source] anyhow::Error),
    #[error("failed to create chat channel: {0:#}")]
    CreateChannel(#[source] anyhow::Error),
    #[error("failed to send message: {0:#}")]
    Send(#[source] anyhow::Error),
    #[error("live updates stopped: {0:#}")]
    Subscription(#[source] anyhow::Error),
}

impl ChatError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::EmptyMessage
            | Self::MissingChannel
            | Self::MissingParticipant
            | Self::SelfConversation => ErrorCode::Validation,
            Self::Lookup(_) | Self::Subscription(_) => ErrorCode::Unavailable,
            Self::CreateChannel(_) | Self::Send(_) => ErrorCode::WriteFailed,
        }
    }

    /// Rejected locally; no store operation was attempted.
    pub fn is_validation(&self) -> bool {
        matches!(self.code(), ErrorCode::Validation)
    }
}

impl From<&ChatError> for ErrorNotice {
    fn from(value: &ChatError) -> Self {
        ErrorNotice::new(value.code(), value.to_string())
    }
}

impl From<ChatError> for ErrorNotice {
    fn from(value: ChatError) -> Self {
        Self::from(&value)
    }
}
