use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    NotFound,
    Unavailable,
    WriteFailed,
    Internal,
}

/// User-facing notice for a failed chat operation. Never fatal; the screen
/// that triggered it decides whether to stay open.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code:?}: {message}")]
pub struct ErrorNotice {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorNotice {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Validation notices are shown inline and leave the screen usable.
    pub fn is_inline(&self) -> bool {
        matches!(self.code, ErrorCode::Validation)
    }
}
