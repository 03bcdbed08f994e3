use uuid::Uuid;

use claquete_types::models::{Offer, OfferRecord, OfferStatus, UserId};

/// Query and mutation interface of the backend the conversation list reads.
///
/// Calls block; async callers run them on the blocking pool.
pub trait OfferSource: Send + Sync + 'static {
    /// Offers `user` is a party to, most recently updated first, each with
    /// its messages in ascending `sent_at` order.
    fn offers_for_user(&self, user: UserId) -> anyhow::Result<Vec<OfferRecord>>;

    /// Stamps `read_at` on every unread message of the offer addressed to
    /// `viewer`. Returns how many messages changed.
    fn mark_conversation_read(&self, offer_id: Uuid, viewer: UserId) -> anyhow::Result<usize>;

    /// Moves the offer to `status` on behalf of `actor`.
    fn respond_to_offer(&self, offer_id: Uuid, actor: UserId, status: OfferStatus) -> anyhow::Result<Offer>;
}
