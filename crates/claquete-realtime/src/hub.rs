use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::{info, trace};

use claquete_types::events::RowChange;

use crate::RealtimeError;

/// Source of row-level change events.
///
/// A failed `subscribe` means there is no live connection; callers degrade
/// to "no realtime" rather than surfacing an error.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self) -> Result<broadcast::Receiver<RowChange>, RealtimeError>;
}

/// In-process change feed. Every subscriber receives every change and
/// filters on its own side.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    /// `None` after shutdown; dropping the sender closes every receiver.
    tx: RwLock<Option<broadcast::Sender<RowChange>>>,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(HubInner {
                tx: RwLock::new(Some(tx)),
            }),
        }
    }

    /// Publish a change to all current subscribers. Fire and forget.
    pub fn publish(&self, change: RowChange) {
        let Ok(tx) = self.inner.tx.read() else {
            return;
        };
        if let Some(tx) = tx.as_ref() {
            trace!(table = ?change.table, kind = ?change.kind, "publishing row change");
            let _ = tx.send(change);
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.inner
            .tx
            .read()
            .ok()
            .and_then(|tx| tx.as_ref().map(|tx| tx.receiver_count()))
            .unwrap_or(0)
    }

    /// Stop the feed. Live receivers drain and then observe the close;
    /// further `subscribe` calls fail.
    pub fn shutdown(&self) {
        if let Ok(mut tx) = self.inner.tx.write() {
            if tx.take().is_some() {
                info!("Change feed shut down");
            }
        }
    }
}

impl ChangeFeed for Hub {
    fn subscribe(&self) -> Result<broadcast::Receiver<RowChange>, RealtimeError> {
        let tx = self.inner.tx.read().map_err(|_| RealtimeError::FeedClosed)?;
        tx.as_ref()
            .map(|tx| tx.subscribe())
            .ok_or(RealtimeError::FeedClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claquete_types::events::{ChangeKind, Table};

    fn change() -> RowChange {
        RowChange {
            table: Table::Messages,
            kind: ChangeKind::Insert,
            record: serde_json::json!({ "id": "m1" }),
        }
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let hub = Hub::new(16);
        let mut a = hub.subscribe().unwrap();
        let mut b = hub.subscribe().unwrap();
        assert_eq!(hub.receiver_count(), 2);

        hub.publish(change());

        assert_eq!(a.recv().await.unwrap(), change());
        assert_eq!(b.recv().await.unwrap(), change());
    }

    #[tokio::test]
    async fn shutdown_rejects_new_subscribers() {
        let hub = Hub::new(16);
        let mut rx = hub.subscribe().unwrap();

        hub.shutdown();
        hub.shutdown();

        assert!(matches!(hub.subscribe(), Err(RealtimeError::FeedClosed)));
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        // Publishing into a closed hub is a no-op.
        hub.publish(change());
        assert_eq!(hub.receiver_count(), 0);
    }
}
