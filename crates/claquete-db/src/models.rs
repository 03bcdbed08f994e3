/// Database row types: these map directly to SQLite rows.
/// Conversion into the shared model types happens here so queries stay flat.
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use claquete_types::models::{Message, Offer, OfferStatus, Profile};

pub struct ProfileRow {
    pub id: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
}

pub struct OfferRow {
    pub id: String,
    pub title: String,
    pub service_type: String,
    pub status: String,
    pub client_id: String,
    pub freelancer_id: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub offer_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub sent_at: String,
    pub read_at: Option<String>,
}

/// Fixed-width UTC timestamps so that TEXT ordering equals time ordering.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .with_context(|| format!("Corrupt timestamp '{}'", s))
}

fn parse_id(s: &str) -> Result<Uuid> {
    s.parse().with_context(|| format!("Corrupt id '{}'", s))
}

impl TryFrom<ProfileRow> for Profile {
    type Error = anyhow::Error;

    fn try_from(row: ProfileRow) -> Result<Self> {
        Ok(Profile {
            id: parse_id(&row.id)?,
            full_name: row.full_name,
            avatar_url: row.avatar_url,
        })
    }
}

impl TryFrom<OfferRow> for Offer {
    type Error = anyhow::Error;

    fn try_from(row: OfferRow) -> Result<Self> {
        Ok(Offer {
            id: parse_id(&row.id)?,
            title: row.title,
            service_type: row.service_type,
            status: OfferStatus::parse(&row.status),
            client_id: parse_id(&row.client_id)?,
            freelancer_id: parse_id(&row.freelancer_id)?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: parse_id(&row.id)?,
            offer_id: parse_id(&row.offer_id)?,
            sender_id: parse_id(&row.sender_id)?,
            receiver_id: parse_id(&row.receiver_id)?,
            content: row.content,
            sent_at: parse_ts(&row.sent_at)?,
            read_at: row.read_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}
