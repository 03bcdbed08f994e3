use std::path::PathBuf;

use chrono::{FixedOffset, Offset, Utc};

use crate::error::{Result, SyncError};

/// Runtime configuration, read from the environment (`.env` is loaded by the
/// binary before this runs).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub db_path: PathBuf,
    /// Offset used to render message times as local `HH:MM`.
    pub utc_offset: FixedOffset,
    /// Buffered change events per feed subscriber before it lags.
    pub feed_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("claquete.db"),
            // Brasília time
            utc_offset: FixedOffset::west_opt(3 * 3600).unwrap_or_else(|| Utc.fix()),
            feed_capacity: 1024,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let db_path = std::env::var("CLAQUETE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let utc_offset = match std::env::var("CLAQUETE_UTC_OFFSET_MINUTES") {
            Ok(raw) => parse_offset(&raw)?,
            Err(_) => defaults.utc_offset,
        };

        let feed_capacity = match std::env::var("CLAQUETE_FEED_CAPACITY") {
            Ok(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| SyncError::Config(format!("CLAQUETE_FEED_CAPACITY must be a positive integer, got '{}'", raw)))?,
            Err(_) => defaults.feed_capacity,
        };

        Ok(Self {
            db_path,
            utc_offset,
            feed_capacity,
        })
    }
}

/// Parses a signed offset in minutes east of UTC (`-180` for UTC-03:00).
pub fn parse_offset(raw: &str) -> Result<FixedOffset> {
    raw.trim()
        .parse::<i32>()
        .ok()
        .and_then(|minutes| minutes.checked_mul(60))
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| SyncError::Config(format!("invalid UTC offset '{}'", raw)))
}
