use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Tables whose update times are tracked in the market replica's `updatelog`.
pub const TRACKED_TABLES: [&str; 4] = ["marketstats", "market_history", "doctrines", "marketorders"];

/// Name of the table recording per-table update times.
pub const UPDATE_LOG_TABLE: &str = "updatelog";

/// A table is stale once its last update is older than this.
pub const STALE_AFTER_HOURS: i64 = 2;

/// Freshness of one table as seen from a given connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateStatus {
    pub updated: Option<DateTime<Utc>>,
    pub time_since_secs: Option<i64>,
    pub needs_update: bool,
}

impl UpdateStatus {
    pub fn evaluate(updated: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let time_since = updated.map(|ts| now - ts);
        Self {
            updated,
            time_since_secs: time_since.map(|d| d.num_seconds()),
            needs_update: time_since
                .map(|d| d > Duration::hours(STALE_AFTER_HOURS))
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stale_after_two_hours() {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();
        let fresh = UpdateStatus::evaluate(Some(now - Duration::minutes(90)), now);
        assert!(!fresh.needs_update);
        assert_eq!(fresh.time_since_secs, Some(90 * 60));

        let stale = UpdateStatus::evaluate(Some(now - Duration::minutes(121)), now);
        assert!(stale.needs_update);
    }

    #[test]
    fn unknown_update_is_not_flagged() {
        let now = Utc::now();
        let status = UpdateStatus::evaluate(None, now);
        assert_eq!(status.time_since_secs, None);
        assert!(!status.needs_update);
    }
}
