use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

/// Negotiation state of an offer.
///
/// Values the client does not know about (e.g. `"archived"`) deserialize to
/// `Unknown` instead of failing, so a change-feed row with a newer status
/// still produces a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    CounterOffer,
    Completed,
    #[serde(other)]
    Unknown,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::CounterOffer => "counter_offer",
            Self::Completed => "completed",
            Self::Unknown => "unknown",
        }
    }

    /// Lenient parse: anything unrecognised maps to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "accepted" => Self::Accepted,
            "rejected" => Self::Rejected,
            "counter_offer" => Self::CounterOffer,
            "completed" => Self::Completed,
            _ => Self::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed)
    }

    /// Whether `next` is a legal step from `self`.
    ///
    /// `counter_offer -> counter_offer` is the re-negotiation loop.
    pub fn can_transition_to(&self, next: OfferStatus) -> bool {
        use OfferStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted | Rejected | CounterOffer)
                | (CounterOffer, Accepted | Rejected | CounterOffer)
                | (Accepted, Completed)
        )
    }
}

impl std::fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub title: String,
    /// Specialty being hired, e.g. "Operador de câmera".
    pub service_type: String,
    pub status: OfferStatus,
    pub client_id: UserId,
    pub freelancer_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A message inside an offer's conversation.
/// Immutable except `read_at`, which is set once and never cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_unread_for(&self, viewer: UserId) -> bool {
        self.sender_id != viewer && self.read_at.is_none()
    }
}

/// Public display identity of a client or freelancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub full_name: String,
    pub avatar_url: Option<String>,
}

/// One row of the conversation query: an offer, both parties' profiles and
/// its messages ordered by `sent_at` ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferRecord {
    pub offer: Offer,
    pub client: Option<Profile>,
    pub freelancer: Option<Profile>,
    pub messages: Vec<Message>,
}

/// Which side of an offer the viewing user occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perspective {
    Client,
    Freelancer,
}

impl Perspective {
    /// Resolves the viewer's side by identity. `None` when the viewer is
    /// not a party to the offer.
    pub fn of(offer: &Offer, viewer: UserId) -> Option<Self> {
        if viewer == offer.client_id {
            Some(Self::Client)
        } else if viewer == offer.freelancer_id {
            Some(Self::Freelancer)
        } else {
            None
        }
    }
}

/// Display record for the conversation list. Derived on every fetch, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationView {
    /// Same as the offer id.
    pub id: Uuid,
    pub perspective: Perspective,
    pub counterpart_id: UserId,
    pub counterpart_name: String,
    pub counterpart_avatar: Option<String>,
    pub last_message: String,
    pub last_message_time: String,
    pub last_message_at: DateTime<Utc>,
    pub unread_count: u32,
    pub service_type: String,
    pub status: OfferStatus,
    pub title: String,
}
