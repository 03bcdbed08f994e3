use std::sync::{Arc, Mutex, MutexGuard};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use claquete_realtime::{ChangeFeed, Channel, RealtimeError};
use claquete_types::events::{ChangeFilter, ChangeKind, RowChange, Table};
use claquete_types::models::OfferStatus;

use crate::auth::SessionToken;
use crate::counter::UnreadCounter;
use crate::labels;
use crate::sink::NotificationSink;

/// The slice of an offer row the notification handlers read.
#[derive(Debug, Deserialize)]
struct OfferChange {
    #[serde(default)]
    title: String,
    #[serde(default = "unknown_status")]
    status: OfferStatus,
}

fn unknown_status() -> OfferStatus {
    OfferStatus::Unknown
}

/// Keeps one live channel per event stream for the signed-in session.
///
/// - `offers:{user}`: inserts where the user is the freelancer (new offer)
///   and updates where the user is the client (status change);
/// - `messages:{user}`: inserts where the user is the receiver.
///
/// Every matching event raises a toast and bumps the session counter.
/// A stream that fails to subscribe is logged and left inert.
pub struct SubscriptionManager {
    feed: Arc<dyn ChangeFeed>,
    sink: Arc<dyn NotificationSink>,
    active: Mutex<Option<ActiveSubscriptions>>,
}

struct ActiveSubscriptions {
    token: SessionToken,
    channels: Vec<Channel>,
}

impl SubscriptionManager {
    pub fn new(feed: Arc<dyn ChangeFeed>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            feed,
            sink,
            active: Mutex::new(None),
        }
    }

    /// Opens the session's subscriptions. Any previous session's channels are
    /// closed first, before the new ones exist.
    pub fn start(&self, token: SessionToken, counter: UnreadCounter) {
        let mut active = self.lock();
        if let Some(previous) = active.take() {
            close_all(previous);
        }

        let mut channels = Vec::with_capacity(2);
        for (stream, opened) in [
            ("offers", self.open_offers(token, &counter)),
            ("messages", self.open_messages(token, &counter)),
        ] {
            match opened {
                Ok(channel) => channels.push(channel),
                Err(e) => warn!(
                    user_id = %token.user_id,
                    "Realtime {} subscription unavailable, continuing without it: {}",
                    stream,
                    e
                ),
            }
        }

        info!(
            user_id = %token.user_id,
            session_id = %token.session_id,
            live = channels.len(),
            "realtime subscriptions started"
        );
        *active = Some(ActiveSubscriptions { token, channels });
    }

    /// Closes every channel. Idempotent. Once this returns no handler of the
    /// stopped session runs again.
    pub fn stop(&self) {
        if let Some(previous) = self.lock().take() {
            info!(session_id = %previous.token.session_id, "realtime subscriptions stopped");
            close_all(previous);
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    pub fn active_session(&self) -> Option<SessionToken> {
        self.lock().as_ref().map(|a| a.token)
    }

    /// Number of channels currently live for the active session.
    pub fn live_channels(&self) -> usize {
        self.lock()
            .as_ref()
            .map(|a| a.channels.iter().filter(|c| c.is_live()).count())
            .unwrap_or(0)
    }

    fn open_offers(&self, token: SessionToken, counter: &UnreadCounter) -> Result<Channel, RealtimeError> {
        let channel = Channel::open(self.feed.clone(), format!("offers:{}", token.user_id));

        let sink = self.sink.clone();
        let unread = counter.clone();
        channel.on(
            ChangeFilter::new(Table::Offers, ChangeKind::Insert, "freelancer_id", token.user_id),
            move |change| {
                let Some(offer) = decode::<OfferChange>(change, &token) else {
                    return;
                };
                sink.notify(labels::new_offer_toast(&offer.title));
                unread.increment();
            },
        )?;

        let sink = self.sink.clone();
        let unread = counter.clone();
        channel.on(
            ChangeFilter::new(Table::Offers, ChangeKind::Update, "client_id", token.user_id),
            move |change| {
                let Some(offer) = decode::<OfferChange>(change, &token) else {
                    return;
                };
                sink.notify(labels::status_toast(&offer.title, offer.status));
                unread.increment();
            },
        )?;

        channel.subscribe()?;
        Ok(channel)
    }

    fn open_messages(&self, token: SessionToken, counter: &UnreadCounter) -> Result<Channel, RealtimeError> {
        let channel = Channel::open(self.feed.clone(), format!("messages:{}", token.user_id));

        let sink = self.sink.clone();
        let unread = counter.clone();
        channel.on(
            ChangeFilter::new(Table::Messages, ChangeKind::Insert, "receiver_id", token.user_id),
            move |_| {
                debug!(session_id = %token.session_id, "new message event");
                sink.notify(labels::new_message_toast());
                unread.increment();
            },
        )?;

        channel.subscribe()?;
        Ok(channel)
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveSubscriptions>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn close_all(subscriptions: ActiveSubscriptions) {
    for channel in &subscriptions.channels {
        channel.close();
    }
}

fn decode<T: DeserializeOwned>(change: &RowChange, token: &SessionToken) -> Option<T> {
    match T::deserialize(&change.record) {
        Ok(row) => Some(row),
        Err(e) => {
            warn!(
                session_id = %token.session_id,
                table = ?change.table,
                "Skipping undecodable change payload: {}",
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claquete_realtime::Hub;
    use claquete_types::notifications::Toast;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use crate::sink::ChannelSink;

    struct Fixture {
        hub: Hub,
        manager: SubscriptionManager,
        toasts: mpsc::UnboundedReceiver<Toast>,
        token: SessionToken,
        counter: UnreadCounter,
    }

    fn fixture() -> Fixture {
        let hub = Hub::new(64);
        let (sink, toasts) = ChannelSink::new();
        let manager = SubscriptionManager::new(Arc::new(hub.clone()), Arc::new(sink));
        Fixture {
            hub,
            manager,
            toasts,
            token: SessionToken::new(Uuid::from_u128(1)),
            counter: UnreadCounter::new(),
        }
    }

    fn offer_change(kind: ChangeKind, column: &str, user: Uuid, status: &str) -> RowChange {
        let mut record = json!({
            "id": Uuid::from_u128(100),
            "title": "Cobertura de casamento",
            "status": status,
            "client_id": Uuid::from_u128(50),
            "freelancer_id": Uuid::from_u128(60),
        });
        record[column] = json!(user);
        RowChange { table: Table::Offers, kind, record }
    }

    fn message_to(user: Uuid) -> RowChange {
        RowChange {
            table: Table::Messages,
            kind: ChangeKind::Insert,
            record: json!({ "id": Uuid::from_u128(9), "receiver_id": user, "content": "oi" }),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn raises_toasts_for_each_stream() {
        let mut f = fixture();
        f.manager.start(f.token, f.counter.clone());
        assert_eq!(f.manager.live_channels(), 2);

        let me = f.token.user_id;
        f.hub.publish(offer_change(ChangeKind::Insert, "freelancer_id", me, "pending"));
        settle().await;
        let toast = f.toasts.try_recv().unwrap();
        assert_eq!(toast.title, labels::NEW_OFFER_TITLE);
        assert_eq!(toast.description, "Cobertura de casamento");

        f.hub.publish(offer_change(ChangeKind::Update, "client_id", me, "counter_offer"));
        settle().await;
        assert_eq!(f.toasts.try_recv().unwrap().title, "Proposta contraproposta recebida");

        f.hub.publish(message_to(me));
        settle().await;
        assert_eq!(f.toasts.try_recv().unwrap().title, labels::NEW_MESSAGE_TITLE);

        assert_eq!(f.counter.get(), 3);
    }

    #[tokio::test]
    async fn unmapped_status_uses_generic_label() {
        let mut f = fixture();
        f.manager.start(f.token, f.counter.clone());

        f.hub.publish(offer_change(ChangeKind::Update, "client_id", f.token.user_id, "archived"));
        settle().await;

        assert_eq!(f.toasts.try_recv().unwrap().title, "Proposta atualizada");
        assert_eq!(f.counter.get(), 1);
    }

    #[tokio::test]
    async fn ignores_events_for_other_roles_and_users() {
        let mut f = fixture();
        f.manager.start(f.token, f.counter.clone());
        let me = f.token.user_id;
        let someone = Uuid::from_u128(2);

        // Offer inserted where I am the client: not addressed to me.
        f.hub.publish(offer_change(ChangeKind::Insert, "client_id", me, "pending"));
        // Status update where I am the freelancer.
        f.hub.publish(offer_change(ChangeKind::Update, "freelancer_id", me, "accepted"));
        f.hub.publish(message_to(someone));
        settle().await;

        assert!(f.toasts.try_recv().is_err());
        assert_eq!(f.counter.get(), 0);
    }

    #[tokio::test]
    async fn stop_then_emit_leaves_counter_unchanged() {
        let mut f = fixture();
        f.manager.start(f.token, f.counter.clone());
        f.hub.publish(message_to(f.token.user_id));
        settle().await;
        assert_eq!(f.counter.get(), 1);

        f.manager.stop();
        f.manager.stop();
        assert!(!f.manager.is_active());

        f.hub.publish(message_to(f.token.user_id));
        settle().await;

        assert_eq!(f.counter.get(), 1);
        let _ = f.toasts.try_recv();
        assert!(f.toasts.try_recv().is_err());
    }

    #[tokio::test]
    async fn restart_replaces_previous_session() {
        let f = fixture();
        let first = f.token;
        let first_counter = f.counter.clone();
        f.manager.start(first, first_counter.clone());

        let second = SessionToken::new(Uuid::from_u128(2));
        let second_counter = UnreadCounter::new();
        f.manager.start(second, second_counter.clone());
        assert_eq!(f.manager.active_session(), Some(second));

        f.hub.publish(message_to(first.user_id));
        f.hub.publish(message_to(second.user_id));
        settle().await;

        assert_eq!(first_counter.get(), 0);
        assert_eq!(second_counter.get(), 1);
    }

    #[tokio::test]
    async fn degrades_silently_without_feed() {
        let f = fixture();
        f.hub.shutdown();

        f.manager.start(f.token, f.counter.clone());
        assert!(f.manager.is_active());
        assert_eq!(f.manager.live_channels(), 0);
    }

    #[tokio::test]
    async fn undecodable_offer_payload_is_skipped() {
        let mut f = fixture();
        f.manager.start(f.token, f.counter.clone());

        f.hub.publish(RowChange {
            table: Table::Offers,
            kind: ChangeKind::Insert,
            record: json!({ "freelancer_id": f.token.user_id, "title": 42 }),
        });
        settle().await;

        assert!(f.toasts.try_recv().is_err());
        assert_eq!(f.counter.get(), 0);
    }
}
