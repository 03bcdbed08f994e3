//! Row-change fan-out and named, filtered channels on top of it.

pub mod channel;
pub mod hub;

pub use channel::Channel;
pub use hub::{ChangeFeed, Hub};

#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("change feed is closed")]
    FeedClosed,

    #[error("channel '{0}' is already subscribed")]
    AlreadySubscribed(String),

    #[error("channel '{0}' was closed")]
    Closed(String),
}
