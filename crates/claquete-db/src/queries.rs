use std::collections::HashMap;

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use claquete_types::models::{Message, Offer, OfferRecord, OfferStatus, Profile, UserId};

use crate::Database;
use crate::models::{MessageRow, OfferRow, ProfileRow, format_ts};

const OFFER_COLUMNS: &str =
    "id, title, service_type, status, client_id, freelancer_id, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, offer_id, sender_id, receiver_id, content, sent_at, read_at";

impl Database {
    // -- Profiles --

    pub fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profiles (id, full_name, avatar_url) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET full_name = excluded.full_name, avatar_url = excluded.avatar_url",
                rusqlite::params![profile.id.to_string(), profile.full_name, profile.avatar_url],
            )?;
            Ok(())
        })
    }

    pub fn get_profile(&self, id: UserId) -> Result<Option<Profile>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, full_name, avatar_url FROM profiles WHERE id = ?1",
                [id.to_string()],
                profile_row,
            )
            .optional()?
            .map(Profile::try_from)
            .transpose()
        })
    }

    // -- Offers --

    pub fn insert_offer(&self, offer: &Offer) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO offers (id, title, service_type, status, client_id, freelancer_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    offer.id.to_string(),
                    offer.title,
                    offer.service_type,
                    offer.status.as_str(),
                    offer.client_id.to_string(),
                    offer.freelancer_id.to_string(),
                    format_ts(&offer.created_at),
                    format_ts(&offer.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_offer(&self, id: Uuid) -> Result<Option<Offer>> {
        self.with_conn(|conn| query_offer(conn, id))
    }

    /// Moves an offer to `next`, enforcing the negotiation transition table.
    /// Returns the updated offer.
    pub fn update_offer_status(
        &self,
        id: Uuid,
        next: OfferStatus,
        at: DateTime<Utc>,
    ) -> Result<Offer> {
        self.with_conn(|conn| {
            let mut offer = query_offer(conn, id)?.ok_or_else(|| anyhow!("Offer not found: {}", id))?;

            if !offer.status.can_transition_to(next) {
                bail!("Invalid offer transition {} -> {}", offer.status, next);
            }

            conn.execute(
                "UPDATE offers SET status = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id.to_string(), next.as_str(), format_ts(&at)],
            )?;

            offer.status = next;
            offer.updated_at = at;
            Ok(offer)
        })
    }

    // -- Messages --

    /// Stores a message and bumps the parent offer so it sorts first.
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO messages (id, offer_id, sender_id, receiver_id, content, sent_at, read_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    message.id.to_string(),
                    message.offer_id.to_string(),
                    message.sender_id.to_string(),
                    message.receiver_id.to_string(),
                    message.content,
                    format_ts(&message.sent_at),
                    message.read_at.as_ref().map(format_ts),
                ],
            )?;
            tx.execute(
                "UPDATE offers SET updated_at = ?2 WHERE id = ?1 AND updated_at < ?2",
                rusqlite::params![message.offer_id.to_string(), format_ts(&message.sent_at)],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Sets `read_at` on every unread message of `offer_id` addressed to `reader`.
    /// Already-read messages keep their original receipt. Returns rows changed.
    pub fn mark_messages_read(&self, offer_id: Uuid, reader: UserId, at: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET read_at = ?3
                 WHERE offer_id = ?1 AND receiver_id = ?2 AND read_at IS NULL",
                rusqlite::params![offer_id.to_string(), reader.to_string(), format_ts(&at)],
            )?;
            Ok(changed)
        })
    }

    pub fn get_messages(&self, offer_id: Uuid) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages WHERE offer_id = ?1 ORDER BY sent_at ASC, rowid ASC",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([offer_id.to_string()], message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(Message::try_from).collect()
        })
    }

    // -- Conversations --

    /// Every offer `user` is a party to, most recently updated first, each
    /// with both profiles and its messages in ascending `sent_at` order.
    pub fn offers_with_messages(&self, user: UserId) -> Result<Vec<OfferRecord>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM offers
                 WHERE client_id = ?1 OR freelancer_id = ?1
                 ORDER BY updated_at DESC",
                OFFER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let offers = stmt
                .query_map([user.to_string()], offer_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
                .into_iter()
                .map(Offer::try_from)
                .collect::<Result<Vec<_>>>()?;

            if offers.is_empty() {
                return Ok(vec![]);
            }

            let offer_ids: Vec<String> = offers.iter().map(|o| o.id.to_string()).collect();
            let mut messages_by_offer: HashMap<Uuid, Vec<Message>> = HashMap::new();
            for message in query_messages_for_offers(conn, &offer_ids)? {
                messages_by_offer.entry(message.offer_id).or_default().push(message);
            }

            let mut profile_ids: Vec<String> = offers
                .iter()
                .flat_map(|o| [o.client_id.to_string(), o.freelancer_id.to_string()])
                .collect();
            profile_ids.sort();
            profile_ids.dedup();
            let profiles: HashMap<Uuid, Profile> = query_profiles(conn, &profile_ids)?
                .into_iter()
                .map(|p| (p.id, p))
                .collect();

            let records = offers
                .into_iter()
                .map(|offer| OfferRecord {
                    client: profiles.get(&offer.client_id).cloned(),
                    freelancer: profiles.get(&offer.freelancer_id).cloned(),
                    messages: messages_by_offer.remove(&offer.id).unwrap_or_default(),
                    offer,
                })
                .collect();

            Ok(records)
        })
    }
}

fn query_offer(conn: &Connection, id: Uuid) -> Result<Option<Offer>> {
    let sql = format!("SELECT {} FROM offers WHERE id = ?1", OFFER_COLUMNS);
    conn.query_row(&sql, [id.to_string()], offer_row)
        .optional()?
        .map(Offer::try_from)
        .transpose()
}

/// Batch-fetch messages for a set of offers, ascending by `sent_at`. Equal
/// timestamps keep insertion order.
fn query_messages_for_offers(conn: &Connection, offer_ids: &[String]) -> Result<Vec<Message>> {
    let placeholders: Vec<String> = (1..=offer_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT {} FROM messages WHERE offer_id IN ({}) ORDER BY sent_at ASC, rowid ASC",
        MESSAGE_COLUMNS,
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(offer_ids.iter()), message_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(Message::try_from).collect()
}

fn query_profiles(conn: &Connection, ids: &[String]) -> Result<Vec<Profile>> {
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT id, full_name, avatar_url FROM profiles WHERE id IN ({})",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(ids.iter()), profile_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(Profile::try_from).collect()
}

fn profile_row(row: &Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(0)?,
        full_name: row.get(1)?,
        avatar_url: row.get(2)?,
    })
}

fn offer_row(row: &Row<'_>) -> rusqlite::Result<OfferRow> {
    Ok(OfferRow {
        id: row.get(0)?,
        title: row.get(1)?,
        service_type: row.get(2)?,
        status: row.get(3)?,
        client_id: row.get(4)?,
        freelancer_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        offer_id: row.get(1)?,
        sender_id: row.get(2)?,
        receiver_id: row.get(3)?,
        content: row.get(4)?,
        sent_at: row.get(5)?,
        read_at: row.get(6)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn uid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn seed() -> Database {
        let db = Database::open_in_memory().unwrap();
        for (id, name) in [(1, "Carla Cliente"), (2, "Ana Freelancer"), (3, "Bruno Freelancer")] {
            db.upsert_profile(&Profile {
                id: uid(id),
                full_name: name.into(),
                avatar_url: None,
            })
            .unwrap();
        }
        db
    }

    fn offer(id: u128, freelancer: u128, at: i64) -> Offer {
        Offer {
            id: uid(id),
            title: format!("Oferta {}", id),
            service_type: "Operador de câmera".into(),
            status: OfferStatus::Pending,
            client_id: uid(1),
            freelancer_id: uid(freelancer),
            created_at: t(at),
            updated_at: t(at),
        }
    }

    fn message(id: u128, offer: u128, from: u128, to: u128, at: i64) -> Message {
        Message {
            id: uid(id),
            offer_id: uid(offer),
            sender_id: uid(from),
            receiver_id: uid(to),
            content: format!("msg {}", id),
            sent_at: t(at),
            read_at: None,
        }
    }

    #[test]
    fn offers_with_messages_orders_offers_and_messages() {
        let db = seed();
        db.insert_offer(&offer(100, 2, 0)).unwrap();
        db.insert_offer(&offer(200, 3, 5)).unwrap();

        // Inserted out of order; the query must sort ascending.
        db.insert_message(&message(11, 100, 2, 1, 20)).unwrap();
        db.insert_message(&message(10, 100, 1, 2, 10)).unwrap();

        let records = db.offers_with_messages(uid(1)).unwrap();
        assert_eq!(records.len(), 2);

        // Offer 100 got a message at t+20, so it is now the most recently updated.
        assert_eq!(records[0].offer.id, uid(100));
        assert_eq!(records[1].offer.id, uid(200));

        let ids: Vec<Uuid> = records[0].messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![uid(10), uid(11)]);
        assert!(records[1].messages.is_empty());

        assert_eq!(records[0].freelancer.as_ref().unwrap().full_name, "Ana Freelancer");
        assert_eq!(records[0].client.as_ref().unwrap().full_name, "Carla Cliente");
    }

    #[test]
    fn same_instant_messages_keep_insertion_order() {
        let db = seed();
        db.insert_offer(&offer(100, 2, 0)).unwrap();
        // The later message has the smaller id.
        db.insert_message(&message(90, 100, 1, 2, 5)).unwrap();
        db.insert_message(&message(10, 100, 2, 1, 5)).unwrap();

        let records = db.offers_with_messages(uid(1)).unwrap();
        let ids: Vec<Uuid> = records[0].messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![uid(90), uid(10)]);

        let ids: Vec<Uuid> = db.get_messages(uid(100)).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![uid(90), uid(10)]);
    }

    #[test]
    fn offers_are_scoped_to_parties() {
        let db = seed();
        db.insert_offer(&offer(100, 2, 0)).unwrap();

        assert_eq!(db.offers_with_messages(uid(2)).unwrap().len(), 1);
        assert!(db.offers_with_messages(uid(3)).unwrap().is_empty());
    }

    #[test]
    fn mark_read_only_touches_unread_incoming() {
        let db = seed();
        db.insert_offer(&offer(100, 2, 0)).unwrap();
        db.insert_message(&message(10, 100, 1, 2, 1)).unwrap();
        db.insert_message(&message(11, 100, 2, 1, 2)).unwrap();

        assert_eq!(db.mark_messages_read(uid(100), uid(2), t(3)).unwrap(), 1);
        // Second pass changes nothing and keeps the first receipt.
        assert_eq!(db.mark_messages_read(uid(100), uid(2), t(9)).unwrap(), 0);

        let messages = db.get_messages(uid(100)).unwrap();
        assert_eq!(messages[0].read_at, Some(t(3)));
        assert_eq!(messages[1].read_at, None);
    }

    #[test]
    fn status_update_enforces_transitions() {
        let db = seed();
        db.insert_offer(&offer(100, 2, 0)).unwrap();

        let updated = db.update_offer_status(uid(100), OfferStatus::CounterOffer, t(1)).unwrap();
        assert_eq!(updated.status, OfferStatus::CounterOffer);
        assert_eq!(updated.updated_at, t(1));

        db.update_offer_status(uid(100), OfferStatus::Accepted, t(2)).unwrap();
        assert!(db.update_offer_status(uid(100), OfferStatus::Rejected, t(3)).is_err());
        assert!(db.update_offer_status(uid(999), OfferStatus::Accepted, t(3)).is_err());

        let stored = db.get_offer(uid(100)).unwrap().unwrap();
        assert_eq!(stored.status, OfferStatus::Accepted);
    }

    #[test]
    fn profile_upsert_overwrites() {
        let db = seed();
        db.upsert_profile(&Profile {
            id: uid(2),
            full_name: "Ana Souza".into(),
            avatar_url: Some("avatars/ana.png".into()),
        })
        .unwrap();

        let profile = db.get_profile(uid(2)).unwrap().unwrap();
        assert_eq!(profile.full_name, "Ana Souza");
        assert_eq!(profile.avatar_url.as_deref(), Some("avatars/ana.png"));
        assert!(db.get_profile(uid(42)).unwrap().is_none());
    }
}
