use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use claquete_types::models::UserId;

use crate::error::{Result, SyncError};

/// Immutable identity of one signed-in session. A new token is minted on
/// every sign-in, even for the same user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken {
    pub user_id: UserId,
    pub session_id: Uuid,
}

impl SessionToken {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            session_id: Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unknown,
    Loading,
    Authenticated(SessionToken),
    Anonymous,
}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Loading => "loading",
            Self::Authenticated(_) => "authenticated",
            Self::Anonymous => "anonymous",
        }
    }

    pub fn session(&self) -> Option<SessionToken> {
        match self {
            Self::Authenticated(token) => Some(*token),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Unknown | Self::Loading)
    }

    fn allows(&self, next: &AuthState) -> bool {
        use AuthState::*;
        matches!(
            (self, next),
            (Unknown, Loading)
                | (Loading, Authenticated(_))
                | (Loading, Anonymous)
                | (Authenticated(_), Anonymous)
                | (Anonymous, Loading)
        )
    }
}

/// Current-user context. Observers follow it through [`AuthContext::watch`].
pub struct AuthContext {
    tx: watch::Sender<AuthState>,
}

impl Default for AuthContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthContext {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AuthState::Unknown);
        Self { tx }
    }

    pub fn current(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    pub fn begin_loading(&self) -> Result<()> {
        self.transition(AuthState::Loading)
    }

    /// Completes a pending sign-in and returns the new session token.
    pub fn sign_in(&self, user_id: UserId) -> Result<SessionToken> {
        let token = SessionToken::new(user_id);
        self.transition(AuthState::Authenticated(token))?;
        info!(%user_id, session_id = %token.session_id, "signed in");
        Ok(token)
    }

    /// Ends the session, or resolves a pending load to "no user".
    pub fn sign_out(&self) -> Result<()> {
        self.transition(AuthState::Anonymous)?;
        info!("signed out");
        Ok(())
    }

    fn transition(&self, next: AuthState) -> Result<()> {
        let mut rejected = None;
        self.tx.send_if_modified(|state| {
            if state.allows(&next) {
                *state = next.clone();
                true
            } else {
                rejected = Some(state.name());
                false
            }
        });

        match rejected {
            Some(from) => Err(SyncError::InvalidAuthTransition {
                from,
                to: next.name(),
            }),
            None => Ok(()),
        }
    }
}
