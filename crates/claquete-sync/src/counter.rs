use std::sync::Arc;

use tokio::sync::watch;

/// Session-scoped count of notification events not yet acknowledged.
///
/// Only ever incremented by the subscription handlers and reset wholesale by
/// a read-all acknowledgement. Never persisted: a new session starts at zero
/// whatever the real backlog is. Accurate unread state comes from the
/// conversation refresh, not from here.
#[derive(Clone)]
pub struct UnreadCounter {
    tx: Arc<watch::Sender<u32>>,
}

impl Default for UnreadCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl UnreadCounter {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn increment(&self) {
        self.tx.send_modify(|n| *n = n.saturating_add(1));
    }

    /// Read-all acknowledgement.
    pub fn reset(&self) {
        self.tx.send_replace(0);
    }

    pub fn get(&self) -> u32 {
        *self.tx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<u32> {
        self.tx.subscribe()
    }
}
