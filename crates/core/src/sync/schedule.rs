use chrono::{DateTime, Duration, NaiveTime, TimeZone, Timelike, Utc};

use super::sync_state_model::SyncState;

/// Hours between scheduled syncs.
pub const SYNC_INTERVAL_HOURS: i64 = 2;

/// Static sync slots, every two hours starting at 12:00 UTC.
pub const SYNC_SCHEDULE: [&str; 12] = [
    "12:00", "14:00", "16:00", "18:00", "20:00", "22:00", "00:00", "02:00", "04:00", "06:00",
    "08:00", "10:00",
];

fn start_of_day(value: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&value.date_naive().and_time(NaiveTime::default()))
}

fn top_of_hour(value: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(value) + Duration::hours(i64::from(value.hour()))
}

/// Next even-hour slot after `last_sync`.
///
/// A slot that already lies in the past relative to `now` collapses to the most
/// recent even hour, so an overdue scheduler fires straight away instead of
/// waiting for the next slot.
pub fn next_sync_time(last_sync: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let hour = i64::from(last_sync.hour());
    let day = start_of_day(last_sync);

    let candidate = if hour >= 22 {
        day + Duration::days(1)
    } else if hour % 2 == 0 {
        day + Duration::hours(hour + SYNC_INTERVAL_HOURS)
    } else {
        day + Duration::hours(hour + 1)
    };

    if candidate >= now {
        return candidate;
    }

    let current = top_of_hour(now);
    if (now + Duration::hours(SYNC_INTERVAL_HOURS)).hour() % 2 == 0 {
        current
    } else {
        current - Duration::hours(1)
    }
}

pub fn is_sync_due(state: &SyncState, now: DateTime<Utc>) -> bool {
    now > state.next_scheduled_sync
}

/// Time left until the next scheduled sync, or `None` once it is overdue.
pub fn time_until_next_sync(state: &SyncState, now: DateTime<Utc>) -> Option<Duration> {
    let remaining = state.next_scheduled_sync - now;
    if remaining < Duration::zero() {
        None
    } else {
        Some(remaining)
    }
}

/// Renders a wait as "N hours, M minutes" with singular forms where needed.
pub fn format_time_until(remaining: Duration) -> String {
    let total = remaining.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;

    let minute_label = if minutes == 1 { "minute" } else { "minutes" };
    if hours == 0 {
        return format!("{} {}", minutes, minute_label);
    }
    let hour_label = if hours == 1 { "hour" } else { "hours" };
    format!("{} {}, {} {}", hours, hour_label, minutes, minute_label)
}
