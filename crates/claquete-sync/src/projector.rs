use chrono::FixedOffset;
use tracing::debug;

use claquete_types::models::{ConversationView, OfferRecord, Perspective, Profile, UserId};

/// Preview text when the last message has no content.
pub const EMPTY_PREVIEW: &str = "Nova conversa";

/// Turns a batch of offers with their messages into conversation list rows.
///
/// Pure: the same batch and viewer always give the same output. Input order
/// is preserved, and each offer's messages are trusted to already be in
/// ascending `sent_at` order (the query guarantees it), so the last element
/// is the latest message.
#[derive(Debug, Clone, Copy)]
pub struct Projector {
    utc_offset: FixedOffset,
}

impl Projector {
    pub fn new(utc_offset: FixedOffset) -> Self {
        Self { utc_offset }
    }

    pub fn project(&self, records: &[OfferRecord], viewer: UserId) -> Vec<ConversationView> {
        records
            .iter()
            .filter_map(|record| self.project_one(record, viewer))
            .collect()
    }

    fn project_one(&self, record: &OfferRecord, viewer: UserId) -> Option<ConversationView> {
        let last = record.messages.last()?;

        let Some(perspective) = Perspective::of(&record.offer, viewer) else {
            debug!(offer_id = %record.offer.id, %viewer, "viewer is not a party, skipping offer");
            return None;
        };

        let (counterpart_id, counterpart) = match perspective {
            Perspective::Client => (record.offer.freelancer_id, record.freelancer.as_ref()),
            Perspective::Freelancer => (record.offer.client_id, record.client.as_ref()),
        };

        let unread_count = record
            .messages
            .iter()
            .filter(|m| m.is_unread_for(viewer))
            .count() as u32;

        let last_message = if last.content.trim().is_empty() {
            EMPTY_PREVIEW.to_string()
        } else {
            last.content.clone()
        };

        Some(ConversationView {
            id: record.offer.id,
            perspective,
            counterpart_id,
            counterpart_name: counterpart.map(|p| p.full_name.clone()).unwrap_or_default(),
            counterpart_avatar: counterpart.and_then(|p: &Profile| p.avatar_url.clone()),
            last_message,
            last_message_time: last
                .sent_at
                .with_timezone(&self.utc_offset)
                .format("%H:%M")
                .to_string(),
            last_message_at: last.sent_at,
            unread_count,
            service_type: record.offer.service_type.clone(),
            status: record.offer.status,
            title: record.offer.title.clone(),
        })
    }
}

pub fn unread_total(conversations: &[ConversationView]) -> u32 {
    conversations.iter().map(|c| c.unread_count).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use claquete_types::models::{Message, Offer, OfferStatus};
    use uuid::Uuid;

    const CLIENT: Uuid = Uuid::from_u128(1);
    const FREELANCER: Uuid = Uuid::from_u128(2);

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    fn projector() -> Projector {
        Projector::new(FixedOffset::west_opt(3 * 3600).unwrap())
    }

    fn message(n: u128, sender: Uuid, sent_at: DateTime<Utc>, read_at: Option<DateTime<Utc>>) -> Message {
        let receiver = if sender == CLIENT { FREELANCER } else { CLIENT };
        Message {
            id: Uuid::from_u128(1000 + n),
            offer_id: Uuid::from_u128(100),
            sender_id: sender,
            receiver_id: receiver,
            content: format!("mensagem {}", n),
            sent_at,
            read_at,
        }
    }

    /// Offer "o1": one unread message from the client, then one read message
    /// from the freelancer Ana.
    fn o1() -> OfferRecord {
        OfferRecord {
            offer: Offer {
                id: Uuid::from_u128(100),
                title: "Filmagem de evento".into(),
                service_type: "Cinegrafista".into(),
                status: OfferStatus::Pending,
                client_id: CLIENT,
                freelancer_id: FREELANCER,
                created_at: at(9, 0),
                updated_at: at(15, 30),
            },
            client: Some(Profile {
                id: CLIENT,
                full_name: "Carla".into(),
                avatar_url: None,
            }),
            freelancer: Some(Profile {
                id: FREELANCER,
                full_name: "Ana".into(),
                avatar_url: Some("avatars/ana.png".into()),
            }),
            messages: vec![
                message(1, CLIENT, at(15, 0), None),
                message(2, FREELANCER, at(15, 30), Some(at(16, 0))),
            ],
        }
    }

    #[test]
    fn client_view_of_o1() {
        let views = projector().project(&[o1()], CLIENT);
        assert_eq!(views.len(), 1);

        let view = &views[0];
        assert_eq!(view.id, Uuid::from_u128(100));
        assert_eq!(view.perspective, Perspective::Client);
        assert_eq!(view.counterpart_id, FREELANCER);
        assert_eq!(view.counterpart_name, "Ana");
        assert_eq!(view.counterpart_avatar.as_deref(), Some("avatars/ana.png"));
        // Only the freelancer's message counts, and it has been read.
        assert_eq!(view.unread_count, 0);
        assert_eq!(view.last_message, "mensagem 2");
        assert_eq!(view.last_message_time, "12:30");
        assert_eq!(view.service_type, "Cinegrafista");
        assert_eq!(view.status, OfferStatus::Pending);
        assert_eq!(view.title, "Filmagem de evento");
    }

    #[test]
    fn freelancer_view_of_o1() {
        let views = projector().project(&[o1()], FREELANCER);
        let view = &views[0];
        assert_eq!(view.perspective, Perspective::Freelancer);
        assert_eq!(view.counterpart_name, "Carla");
        assert_eq!(view.unread_count, 1);
        assert_eq!(view.last_message, "mensagem 2");
    }

    #[test]
    fn own_messages_never_count_as_unread() {
        let mut record = o1();
        record.messages = vec![
            message(1, CLIENT, at(10, 0), None),
            message(2, CLIENT, at(10, 5), None),
            message(3, CLIENT, at(10, 9), Some(at(11, 0))),
        ];
        assert_eq!(projector().project(&[record.clone()], CLIENT)[0].unread_count, 0);
        assert_eq!(projector().project(&[record], FREELANCER)[0].unread_count, 2);
    }

    #[test]
    fn offers_without_messages_are_excluded() {
        let mut empty = o1();
        empty.offer.id = Uuid::from_u128(200);
        empty.messages.clear();

        let views = projector().project(&[empty, o1()], CLIENT);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].id, Uuid::from_u128(100));
    }

    #[test]
    fn offers_of_other_users_are_excluded() {
        assert!(projector().project(&[o1()], Uuid::from_u128(99)).is_empty());
    }

    #[test]
    fn preserves_input_order_and_trusts_message_order() {
        let mut second = o1();
        second.offer.id = Uuid::from_u128(300);
        // Deliberately unsorted: the last element still wins.
        second.messages = vec![
            message(5, FREELANCER, at(18, 0), None),
            message(6, FREELANCER, at(8, 0), None),
        ];

        let views = projector().project(&[second, o1()], CLIENT);
        let ids: Vec<Uuid> = views.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![Uuid::from_u128(300), Uuid::from_u128(100)]);
        assert_eq!(views[0].last_message, "mensagem 6");
        assert_eq!(unread_total(&views), 2);
    }

    #[test]
    fn empty_content_uses_placeholder_and_missing_profile_is_blank() {
        let mut record = o1();
        record.freelancer = None;
        if let Some(last) = record.messages.last_mut() {
            last.content = "  ".into();
        }

        let views = projector().project(&[record], CLIENT);
        let view = &views[0];
        assert_eq!(view.last_message, EMPTY_PREVIEW);
        assert_eq!(view.counterpart_name, "");
        assert_eq!(view.counterpart_avatar, None);
    }

    #[test]
    fn projection_is_idempotent() {
        let batch = vec![o1(), o1()];
        let p = projector();
        assert_eq!(p.project(&batch, CLIENT), p.project(&batch, CLIENT));
    }
}
