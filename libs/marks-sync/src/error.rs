use crate::validate::ValidationErrors;

/// A failure talking to the remote store or session provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("session is no longer valid")]
    Unauthorized,
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for RemoteError {
    fn from(err: url::ParseError) -> Self {
        RemoteError::Transport(format!("invalid url: {err}"))
    }
}

/// Why a synchronizer operation did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("invalid bookmark input")]
    Validation(ValidationErrors),
    #[error("a submission is already in flight")]
    Busy,
    #[error("session expired")]
    SessionExpired,
    /// The session changed before the call finished; its result was dropped.
    #[error("superseded by a session switch")]
    Superseded,
    #[error(transparent)]
    Remote(RemoteError),
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unauthorized => SyncError::SessionExpired,
            other => SyncError::Remote(other),
        }
    }
}

/// Non-fatal error flag published alongside the synchronizer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFailure {
    /// The last fetch failed; the bookmarks shown are stale.
    Fetch,
    Add,
    Delete,
    /// The session is gone. Presentation returns to the sign-in entry point.
    SessionExpired,
}

impl SyncFailure {
    pub fn user_message(&self) -> &'static str {
        match self {
            SyncFailure::Fetch => "Failed to load bookmarks",
            SyncFailure::Add => ADD_FAILED_MESSAGE,
            SyncFailure::Delete => "Failed to delete bookmark",
            SyncFailure::SessionExpired => "Your session has expired. Please sign in again.",
        }
    }
}

pub(crate) const ADD_FAILED_MESSAGE: &str = "Failed to add bookmark. Please try again.";
