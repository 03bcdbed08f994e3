use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use claquete_db::Database;
use claquete_realtime::Hub;
use claquete_types::events::{ChangeKind, RowChange, Table};
use claquete_types::models::{Message, Offer, OfferRecord, OfferStatus, Profile, UserId};

use crate::source::OfferSource;

/// SQLite store plus in-process change feed, standing in for the hosted
/// backend. Every write is stored first and then published on the hub.
#[derive(Clone)]
pub struct LocalBackend {
    db: Arc<Database>,
    hub: Hub,
}

impl LocalBackend {
    pub fn new(db: Database, hub: Hub) -> Self {
        Self {
            db: Arc::new(db),
            hub,
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        self.db.upsert_profile(profile)
    }

    /// A client proposes an engagement to a freelancer.
    pub fn create_offer(
        &self,
        client_id: UserId,
        freelancer_id: UserId,
        title: &str,
        service_type: &str,
    ) -> Result<Offer> {
        if client_id == freelancer_id {
            bail!("Client and freelancer must be different users");
        }

        let now = Utc::now();
        let offer = Offer {
            id: Uuid::new_v4(),
            title: title.to_string(),
            service_type: service_type.to_string(),
            status: OfferStatus::Pending,
            client_id,
            freelancer_id,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_offer(&offer)?;

        info!(offer_id = %offer.id, %client_id, %freelancer_id, "offer created");
        self.publish(Table::Offers, ChangeKind::Insert, &offer);
        Ok(offer)
    }

    /// Sends a message inside an offer; the receiver is the other party.
    pub fn send_message(&self, offer_id: Uuid, sender_id: UserId, content: &str) -> Result<Message> {
        let offer = self
            .db
            .get_offer(offer_id)?
            .ok_or_else(|| anyhow!("Offer not found: {}", offer_id))?;

        let receiver_id = if sender_id == offer.client_id {
            offer.freelancer_id
        } else if sender_id == offer.freelancer_id {
            offer.client_id
        } else {
            bail!("User {} is not a party to offer {}", sender_id, offer_id);
        };

        let message = Message {
            id: Uuid::new_v4(),
            offer_id,
            sender_id,
            receiver_id,
            content: content.to_string(),
            sent_at: Utc::now(),
            read_at: None,
        };
        self.db.insert_message(&message)?;

        self.publish(Table::Messages, ChangeKind::Insert, &message);
        Ok(message)
    }

    fn publish<T: Serialize>(&self, table: Table, kind: ChangeKind, row: &T) {
        match RowChange::new(table, kind, row) {
            Ok(change) => self.hub.publish(change),
            Err(e) => warn!(?table, "Failed to encode row change: {}", e),
        }
    }
}

impl OfferSource for LocalBackend {
    fn offers_for_user(&self, user: UserId) -> Result<Vec<OfferRecord>> {
        self.db.offers_with_messages(user)
    }

    fn mark_conversation_read(&self, offer_id: Uuid, viewer: UserId) -> Result<usize> {
        self.db.mark_messages_read(offer_id, viewer, Utc::now())
    }

    fn respond_to_offer(&self, offer_id: Uuid, actor: UserId, status: OfferStatus) -> Result<Offer> {
        let offer = self
            .db
            .get_offer(offer_id)?
            .ok_or_else(|| anyhow!("Offer not found: {}", offer_id))?;
        if actor != offer.client_id && actor != offer.freelancer_id {
            bail!("User {} is not a party to offer {}", actor, offer_id);
        }

        let updated = self.db.update_offer_status(offer_id, status, Utc::now())?;
        info!(%offer_id, from = %offer.status, to = %updated.status, "offer status changed");

        self.publish(Table::Offers, ChangeKind::Update, &updated);
        Ok(updated)
    }
}
