use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use wcmkt_core::sync::{
    is_sync_due, next_sync_time, SyncState, SyncStatus, UpdateStatus, TRACKED_TABLES,
};
use wcmkt_core::{DatabaseAlias, Result};

use crate::access::{AccessGuard, AccessMode};
use crate::registry::ConnectionRegistry;

use super::refresher::ReplicaRefresher;
use super::state_store::SyncStateStore;

/// What one `sync` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// State as recorded after the attempt.
    pub state: SyncState,
    /// Freshness check result; `None` when the alias has no marker or the
    /// refresh failed.
    pub validated: Option<bool>,
    /// Why the refresh failed, if it did.
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl SyncOutcome {
    pub fn succeeded(&self) -> bool {
        self.state.status == SyncStatus::Success
    }
}

/// Refreshes replicas under their alias's write lock and records the result.
///
/// Sync never surfaces refresh failures to callers: they end up as
/// `SyncStatus::Failed` in the stored state, and the previous replica keeps
/// being served.
pub struct ReplicaSyncCoordinator {
    registry: Arc<ConnectionRegistry>,
    refresher: Arc<dyn ReplicaRefresher>,
    store: Arc<dyn SyncStateStore>,
}

impl ReplicaSyncCoordinator {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        refresher: Arc<dyn ReplicaRefresher>,
        store: Arc<dyn SyncStateStore>,
    ) -> Self {
        Self {
            registry,
            refresher,
            store,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Last recorded state, or the never-synced state.
    pub fn state(&self, alias: DatabaseAlias) -> Result<SyncState> {
        self.store.load_or_initial(alias)
    }

    pub fn is_due(&self, alias: DatabaseAlias, now: DateTime<Utc>) -> Result<bool> {
        Ok(is_sync_due(&self.state(alias)?, now))
    }

    /// Replaces the local replica of `alias` with the remote's contents.
    ///
    /// Blocks every other access to `alias` until finished.
    pub fn sync(&self, alias: DatabaseAlias) -> SyncOutcome {
        let started = Instant::now();
        let previous = match self.store.load_or_initial(alias) {
            Ok(state) => state,
            Err(e) => {
                warn!("[ReplicaSync] could not load state for '{}': {}", alias, e);
                SyncState::initial(alias)
            }
        };

        let mut access = self.registry.access(alias, AccessMode::Write);
        info!("[ReplicaSync] sync started for '{}'", alias);
        access.dispose();

        let refreshed = access
            .sync_session()
            .and_then(|session| self.refresher.refresh(session));
        // The replica file may have changed underneath whatever was opened.
        access.dispose();

        let now = Utc::now();
        let (state, validated, failure) = match refreshed {
            Ok(()) => {
                let validated = self.validate_locked(&access);
                let status = match validated {
                    Some(false) => SyncStatus::Failed,
                    _ => SyncStatus::Success,
                };
                let state = SyncState {
                    alias,
                    last_sync: now,
                    next_scheduled_sync: next_sync_time(now, now),
                    status,
                };
                (state, validated, None)
            }
            Err(e) => {
                error!("[ReplicaSync] refresh failed for '{}': {}", alias, e);
                let state = SyncState {
                    alias,
                    last_sync: previous.last_sync,
                    next_scheduled_sync: next_sync_time(now, now),
                    status: SyncStatus::Failed,
                };
                (state, None, Some(e.to_string()))
            }
        };

        if let Err(e) = self.store.save(&state) {
            error!("[ReplicaSync] could not persist state for '{}': {}", alias, e);
        }
        drop(access);

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "[ReplicaSync] sync finished for '{}': {} in {}ms, next at {}",
            alias,
            state.status.as_str(),
            duration_ms,
            state.next_scheduled_sync
        );
        SyncOutcome {
            state,
            validated,
            error: failure,
            duration_ms,
        }
    }

    /// Compares the freshness marker on the replica and the remote.
    ///
    /// Aliases without a marker always validate. A mismatch is only logged.
    pub fn validate_sync(&self, alias: DatabaseAlias) -> Result<bool> {
        let access = self.registry.access(alias, AccessMode::Read);
        compare_markers(&access)
    }

    /// Validation under the write guard `sync` already holds. Only the
    /// primary alias is validated after a sync.
    fn validate_locked(&self, access: &AccessGuard<'_>) -> Option<bool> {
        if !access.alias().is_primary() {
            return None;
        }
        match compare_markers(access) {
            Ok(valid) => Some(valid),
            Err(e) => {
                warn!(
                    "[ReplicaSync] validation for '{}' could not run: {}",
                    access.alias(),
                    e
                );
                Some(false)
            }
        }
    }

    /// Update-log freshness of every tracked table on `alias`.
    pub fn update_status(
        &self,
        alias: DatabaseAlias,
        local: bool,
    ) -> Result<BTreeMap<String, UpdateStatus>> {
        let now = Utc::now();
        self.registry.with_access(alias, false, |access| {
            TRACKED_TABLES
                .iter()
                .map(|table| {
                    let updated = access.most_recent_update(table, local)?;
                    Ok((table.to_string(), UpdateStatus::evaluate(updated, now)))
                })
                .collect()
        })
    }
}

impl std::fmt::Debug for ReplicaSyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaSyncCoordinator")
            .field("registry", &self.registry)
            .finish()
    }
}

fn compare_markers(access: &AccessGuard<'_>) -> Result<bool> {
    let alias = access.alias();
    let Some(marker) = alias.freshness_marker() else {
        debug!("[ReplicaSync] '{}' has no freshness marker", alias);
        return Ok(true);
    };
    let local = access.freshness(&marker, true)?;
    let remote = access.freshness(&marker, false)?;
    if local == remote {
        info!(
            "[ReplicaSync] '{}' validated: {}.{} = {:?}",
            alias, marker.table, marker.column, local
        );
        Ok(true)
    } else {
        warn!(
            "[ReplicaSync] '{}' freshness mismatch: local {:?}, remote {:?}",
            alias, local, remote
        );
        Ok(false)
    }
}
