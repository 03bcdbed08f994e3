use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS profiles (
            id          TEXT PRIMARY KEY,
            full_name   TEXT NOT NULL,
            avatar_url  TEXT
        );

        CREATE TABLE IF NOT EXISTS offers (
            id              TEXT PRIMARY KEY,
            title           TEXT NOT NULL,
            service_type    TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending',
            client_id       TEXT NOT NULL REFERENCES profiles(id),
            freelancer_id   TEXT NOT NULL REFERENCES profiles(id),
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_offers_client
            ON offers(client_id, updated_at);

        CREATE INDEX IF NOT EXISTS idx_offers_freelancer
            ON offers(freelancer_id, updated_at);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            offer_id        TEXT NOT NULL REFERENCES offers(id),
            sender_id       TEXT NOT NULL REFERENCES profiles(id),
            receiver_id     TEXT NOT NULL REFERENCES profiles(id),
            content         TEXT NOT NULL,
            sent_at         TEXT NOT NULL,
            read_at         TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_offer
            ON messages(offer_id, sent_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
