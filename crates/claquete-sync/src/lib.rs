//! Session-scoped realtime notifications and conversation sync for the
//! Claquete marketplace client.
//!
//! Two independent paths keep the UI current:
//! - the live path: change-feed events addressed to the signed-in user raise
//!   toasts and bump the session's [`UnreadCounter`];
//! - the refresh path: [`ConversationStore::refresh`] refetches offers and
//!   messages and re-derives previews and unread counts with the [`Projector`].
//!
//! The refresh path is authoritative; the counter is only a nudge.

pub mod auth;
pub mod backend;
pub mod config;
pub mod conversations;
pub mod counter;
pub mod error;
pub mod labels;
pub mod projector;
pub mod session;
pub mod sink;
pub mod source;
pub mod subscriptions;

pub use auth::{AuthContext, AuthState, SessionToken};
pub use backend::LocalBackend;
pub use config::SyncConfig;
pub use conversations::{ConversationState, ConversationStore};
pub use counter::UnreadCounter;
pub use error::{Result, SyncError};
pub use projector::Projector;
pub use session::{SessionController, SessionScope};
pub use sink::{ChannelSink, NotificationSink, TracingSink};
pub use source::OfferSource;
pub use subscriptions::SubscriptionManager;
