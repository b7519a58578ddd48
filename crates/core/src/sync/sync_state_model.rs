use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::databases::DatabaseAlias;

use super::schedule::SYNC_SCHEDULE;

/// Outcome of the most recent sync for an alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SyncStatus {
    Success,
    Failed,
    #[default]
    Unknown,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "Success",
            SyncStatus::Failed => "Failed",
            SyncStatus::Unknown => "Unknown",
        }
    }
}

/// Per-alias sync record. Mutated only by the sync coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub alias: DatabaseAlias,
    #[serde(with = "minute_utc")]
    pub last_sync: DateTime<Utc>,
    #[serde(rename = "next_sync", alias = "next_scheduled_sync", with = "minute_utc")]
    pub next_scheduled_sync: DateTime<Utc>,
    #[serde(default)]
    pub status: SyncStatus,
}

impl SyncState {
    /// State for an alias that has never been synced: due immediately.
    pub fn initial(alias: DatabaseAlias) -> Self {
        Self {
            alias,
            last_sync: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap_or_default(),
            next_scheduled_sync: Utc
                .with_ymd_and_hms(2025, 1, 1, 12, 0, 0)
                .single()
                .unwrap_or_default(),
            status: SyncStatus::Unknown,
        }
    }
}

/// On-disk shape of a sync state: the state itself plus scheduler hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStateRecord {
    #[serde(flatten)]
    pub state: SyncState,
    #[serde(default)]
    pub sync_times: Vec<String>,
    #[serde(default)]
    pub sync_needed: bool,
}

impl SyncStateRecord {
    pub fn new(state: SyncState, now: DateTime<Utc>) -> Self {
        let sync_needed = super::schedule::is_sync_due(&state, now);
        Self {
            state,
            sync_times: SYNC_SCHEDULE.iter().map(|slot| slot.to_string()).collect(),
            sync_needed,
        }
    }
}

/// Serde adapter for the `"%Y-%m-%d %H:%M UTC"` timestamp format.
pub mod minute_utc {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M UTC";

    pub fn format(value: &DateTime<Utc>) -> String {
        value.format(FORMAT).to_string()
    }

    pub fn parse(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        NaiveDateTime::parse_from_str(value.trim(), FORMAT).map(|naive| Utc.from_utc_datetime(&naive))
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}
