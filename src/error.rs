use thiserror::Error;

/// Errors surfaced by the follow-along controller.
#[derive(Debug, Error)]
pub enum FollowAlongError {
    #[error("speech recognition unavailable: {0}")]
    RecognitionUnavailable(String),

    /// Quota refusal; callers show an upgrade prompt rather than an error.
    #[error("daily follow-along limit reached ({used}/{limit})")]
    LimitReached { limit: u32, used: u32 },

    #[error("a follow-along session is already active")]
    AlreadyActive,

    #[error("cannot change surah while a session is active")]
    SessionActive,

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl FollowAlongError {
    pub fn is_limit_reached(&self) -> bool {
        matches!(self, FollowAlongError::LimitReached { .. })
    }
}
