use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::auth::{AuthState, SessionToken};
use crate::conversations::ConversationStore;
use crate::counter::UnreadCounter;
use crate::projector::Projector;
use crate::source::OfferSource;
use crate::subscriptions::SubscriptionManager;

/// Everything owned by one signed-in session.
#[derive(Clone)]
pub struct SessionScope {
    pub token: SessionToken,
    pub counter: UnreadCounter,
    pub cancel: CancellationToken,
}

impl SessionScope {
    /// A conversation list for this session's user. It is closed when the
    /// session ends, or earlier through [`ConversationStore::close`].
    pub fn conversations<S: OfferSource>(&self, source: Arc<S>, projector: Projector) -> ConversationStore<S> {
        ConversationStore::new(source, projector, self.token.user_id, self.cancel.child_token())
    }

    pub fn is_alive(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

/// Follows the auth context and keeps exactly one session scope alive while
/// a user is signed in.
///
/// Switching sessions always tears the old one down completely (channels
/// closed, scope cancelled) before the new one's subscriptions open.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    manager: SubscriptionManager,
    current: Mutex<Option<SessionScope>>,
}

impl SessionController {
    pub fn new(manager: SubscriptionManager) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                manager,
                current: Mutex::new(None),
            }),
        }
    }

    pub fn current(&self) -> Option<SessionScope> {
        self.lock().clone()
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.inner.manager
    }

    /// React to one auth state.
    pub fn apply(&self, state: &AuthState) {
        let mut current = self.lock();
        match state {
            AuthState::Authenticated(token) => {
                if current.as_ref().is_some_and(|scope| scope.token == *token) {
                    return;
                }
                if let Some(previous) = current.take() {
                    self.teardown(previous);
                }

                let scope = SessionScope {
                    token: *token,
                    counter: UnreadCounter::new(),
                    cancel: CancellationToken::new(),
                };
                self.inner.manager.start(scope.token, scope.counter.clone());
                info!(user_id = %token.user_id, session_id = %token.session_id, "session started");
                *current = Some(scope);
            }
            AuthState::Anonymous => {
                if let Some(previous) = current.take() {
                    self.teardown(previous);
                }
            }
            AuthState::Unknown | AuthState::Loading => {
                debug!(state = state.name(), "auth pending, no session change");
            }
        }
    }

    /// Drive sessions from the auth watch until its sender goes away, then
    /// end whatever session is left.
    pub async fn follow(&self, mut auth: watch::Receiver<AuthState>) {
        loop {
            let state = auth.borrow_and_update().clone();
            self.apply(&state);
            if auth.changed().await.is_err() {
                break;
            }
        }
        self.end();
    }

    pub fn end(&self) {
        if let Some(previous) = self.lock().take() {
            self.teardown(previous);
        }
    }

    fn teardown(&self, scope: SessionScope) {
        self.inner.manager.stop();
        scope.cancel.cancel();
        info!(session_id = %scope.token.session_id, "session ended");
    }

    fn lock(&self) -> MutexGuard<'_, Option<SessionScope>> {
        self.inner.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
