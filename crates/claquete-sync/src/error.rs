use uuid::Uuid;

use claquete_realtime::RealtimeError;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid auth transition: {from} -> {to}")]
    InvalidAuthTransition {
        from: &'static str,
        to: &'static str,
    },

    /// Fetch failed; the message is what the view shows.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Mutation failed and any optimistic change was rolled back.
    #[error("Mutation failed: {0}")]
    Mutation(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(Uuid),

    /// The owning scope ended; the result was discarded.
    #[error("Scope cancelled")]
    Cancelled,

    #[error(transparent)]
    Realtime(#[from] RealtimeError),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}
