use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use claquete_types::models::{ConversationView, OfferStatus, UserId};

use crate::error::{Result, SyncError};
use crate::projector::Projector;
use crate::source::OfferSource;

pub const FETCH_ERROR: &str = "Não foi possível carregar as conversas";
pub const MARK_READ_ERROR: &str = "Não foi possível marcar a conversa como lida";
pub const RESPOND_ERROR: &str = "Não foi possível responder à proposta";

/// What the conversation list renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    pub conversations: Vec<ConversationView>,
    pub loading: bool,
    /// User-visible text of the last failure, cleared by the next refresh.
    pub error: Option<String>,
}

/// Conversation list state for one viewer, bound to a scope's lifetime.
///
/// Every continuation re-checks the scope under the state lock before it
/// writes, so a response that lands after `close` is dropped. Only the most
/// recently started refresh may replace the list. Failures are never retried:
/// they set `error` and leave the previous list in place, and optimistic edits
/// are rolled back unless a refresh has landed in the meantime.
pub struct ConversationStore<S: OfferSource> {
    source: Arc<S>,
    projector: Projector,
    viewer: UserId,
    scope: CancellationToken,
    state: Mutex<ConversationState>,
    /// Refreshes started. Both counters only change under the state lock.
    started: AtomicU64,
    /// Refresh results written to the list.
    landed: AtomicU64,
}

impl<S: OfferSource> ConversationStore<S> {
    pub fn new(source: Arc<S>, projector: Projector, viewer: UserId, scope: CancellationToken) -> Self {
        Self {
            source,
            projector,
            viewer,
            scope,
            state: Mutex::new(ConversationState::default()),
            started: AtomicU64::new(0),
            landed: AtomicU64::new(0),
        }
    }

    pub fn viewer(&self) -> UserId {
        self.viewer
    }

    pub fn snapshot(&self) -> ConversationState {
        self.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.scope.is_cancelled()
    }

    /// End the scope. In-flight operations finish without touching state.
    pub fn close(&self) {
        self.scope.cancel();
    }

    /// Refetch offers and messages and re-derive the list. A result that
    /// arrives after a newer refresh has started is dropped.
    pub async fn refresh(&self) -> Result<()> {
        let generation = self.apply(|state| {
            state.loading = true;
            state.error = None;
            self.started.fetch_add(1, Ordering::SeqCst) + 1
        })?;

        let source = self.source.clone();
        let viewer = self.viewer;
        let fetched = tokio::select! {
            _ = self.scope.cancelled() => return Err(SyncError::Cancelled),
            joined = tokio::task::spawn_blocking(move || source.offers_for_user(viewer)) => joined,
        };

        let records = match fetched {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => return self.fail_fetch(generation, e.to_string()),
            Err(e) => {
                error!("spawn_blocking join error: {}", e);
                return self.fail_fetch(generation, e.to_string());
            }
        };

        let conversations = self.projector.project(&records, viewer);
        debug!(%viewer, offers = records.len(), conversations = conversations.len(), "conversations refreshed");

        self.apply(move |state| {
            if !self.is_latest(generation) {
                debug!(%viewer, generation, "superseded refresh result dropped");
                return;
            }
            state.conversations = conversations;
            state.loading = false;
            self.landed.fetch_add(1, Ordering::SeqCst);
        })
    }

    /// Mark every message of a conversation as read. The row's unread count
    /// drops to zero immediately and is restored if the write fails, provided
    /// no refresh has replaced it since.
    pub async fn mark_read(&self, offer_id: Uuid) -> Result<()> {
        let optimistic = self.apply(|state| {
            let landed = self.landed.load(Ordering::SeqCst);
            state
                .conversations
                .iter_mut()
                .find(|c| c.id == offer_id)
                .map(|c| (std::mem::replace(&mut c.unread_count, 0), landed))
        })?;
        let Some((previous, landed)) = optimistic else {
            return Err(SyncError::ConversationNotFound(offer_id));
        };

        let source = self.source.clone();
        let viewer = self.viewer;
        let result = self
            .run_blocking(move || source.mark_conversation_read(offer_id, viewer))
            .await?;

        match result {
            Ok(changed) => {
                debug!(%offer_id, changed, "conversation marked read");
                Ok(())
            }
            Err(e) => {
                warn!(%offer_id, "Failed to mark conversation read: {}", e);
                self.apply(|state| {
                    let untouched = self.landed.load(Ordering::SeqCst) == landed;
                    if let Some(c) = state
                        .conversations
                        .iter_mut()
                        .find(|c| c.id == offer_id && c.unread_count == 0)
                        .filter(|_| untouched)
                    {
                        c.unread_count = previous;
                    }
                    state.error = Some(MARK_READ_ERROR.to_string());
                })?;
                Err(SyncError::Mutation(e.to_string()))
            }
        }
    }

    /// Answer an offer (accept, reject, counter). The row shows the new status
    /// immediately and reverts if the backend refuses.
    pub async fn respond(&self, offer_id: Uuid, status: OfferStatus) -> Result<()> {
        let optimistic = self.apply(|state| {
            let landed = self.landed.load(Ordering::SeqCst);
            state
                .conversations
                .iter_mut()
                .find(|c| c.id == offer_id)
                .map(|c| (std::mem::replace(&mut c.status, status), landed))
        })?;
        let Some((previous, landed)) = optimistic else {
            return Err(SyncError::ConversationNotFound(offer_id));
        };

        let source = self.source.clone();
        let viewer = self.viewer;
        let result = self
            .run_blocking(move || source.respond_to_offer(offer_id, viewer, status))
            .await?;

        match result {
            Ok(offer) => self.apply(|state| {
                if let Some(c) = state.conversations.iter_mut().find(|c| c.id == offer_id) {
                    c.status = offer.status;
                }
            }),
            Err(e) => {
                warn!(%offer_id, %status, "Failed to respond to offer: {}", e);
                self.apply(|state| {
                    let untouched = self.landed.load(Ordering::SeqCst) == landed;
                    if let Some(c) = state
                        .conversations
                        .iter_mut()
                        .find(|c| c.id == offer_id && c.status == status)
                        .filter(|_| untouched)
                    {
                        c.status = previous;
                    }
                    state.error = Some(RESPOND_ERROR.to_string());
                })?;
                Err(SyncError::Mutation(e.to_string()))
            }
        }
    }

    /// A superseded fetch leaves `loading` and `error` to the newer one.
    fn fail_fetch(&self, generation: u64, detail: String) -> Result<()> {
        warn!(viewer = %self.viewer, "Conversation fetch failed: {}", detail);
        self.apply(|state| {
            if self.is_latest(generation) {
                state.loading = false;
                state.error = Some(FETCH_ERROR.to_string());
            }
        })?;
        Err(SyncError::Fetch(detail))
    }

    fn is_latest(&self, generation: u64) -> bool {
        self.started.load(Ordering::SeqCst) == generation
    }

    /// Runs `f` on the blocking pool unless the scope ends first. A join
    /// failure is reported as a backend error.
    async fn run_blocking<T, F>(&self, f: F) -> Result<anyhow::Result<T>>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::select! {
            _ = self.scope.cancelled() => Err(SyncError::Cancelled),
            joined = tokio::task::spawn_blocking(f) => Ok(joined.unwrap_or_else(|e| {
                error!("spawn_blocking join error: {}", e);
                Err(anyhow::anyhow!("background task failed: {}", e))
            })),
        }
    }

    /// Mutates state only while the scope is alive.
    fn apply<T>(&self, f: impl FnOnce(&mut ConversationState) -> T) -> Result<T> {
        let mut state = self.lock();
        if self.scope.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        Ok(f(&mut *state))
    }

    fn lock(&self) -> MutexGuard<'_, ConversationState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
