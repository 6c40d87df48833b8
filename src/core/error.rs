use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SessionError>;

/// Failure categories surfaced to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum ErrorKind {
    #[error("file not found")]
    NotFound,
    #[error("path is inside a protected system directory")]
    Forbidden,
    #[error("file exceeds the maximum allowed size")]
    TooLarge,
    #[error("unsupported file format")]
    UnsupportedFormat,
    #[error("media player is not available")]
    PlayerUnavailable,
    #[error("operation timed out")]
    Timeout,
    #[error("malformed subtitle block")]
    MalformedSubtitleBlock,
    #[error("file changed on disk since it was loaded")]
    Modified,
    #[error("file could not be read")]
    Io,
    #[error("session has been closed")]
    SessionClosed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Rejected(ErrorKind),

    #[error("media player unavailable: {0}")]
    PlayerUnavailable(String),

    #[error("player rejected command: {0}")]
    Command(String),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed player message: {0}")]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Rejected(kind) => *kind,
            SessionError::PlayerUnavailable(_) | SessionError::Command(_) | SessionError::Json(_) => {
                ErrorKind::PlayerUnavailable
            }
            SessionError::Timeout { .. } => ErrorKind::Timeout,
            SessionError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<ErrorKind> for SessionError {
    fn from(kind: ErrorKind) -> Self {
        SessionError::Rejected(kind)
    }
}
