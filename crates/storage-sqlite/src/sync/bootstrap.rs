use std::collections::BTreeMap;

use log::{info, warn};
use serde::Serialize;

use wcmkt_core::DatabaseAlias;

use super::coordinator::ReplicaSyncCoordinator;

/// How startup left one alias's replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum InitStatus {
    AlreadyPresent,
    Synced,
    Failed(String),
}

/// Makes sure every configured alias has a local replica, syncing the ones
/// that are missing. Existing replicas are left alone.
pub fn init_databases(
    coordinator: &ReplicaSyncCoordinator,
) -> BTreeMap<DatabaseAlias, InitStatus> {
    let registry = coordinator.registry();
    let mut results = BTreeMap::new();

    for config in registry.config_table().iter() {
        let alias = config.alias;
        if config.replica_exists() {
            info!(
                "[Init] '{}' replica present at {}",
                alias,
                config.local_path.display()
            );
            results.insert(alias, InitStatus::AlreadyPresent);
            continue;
        }

        info!("[Init] '{}' replica missing, syncing", alias);
        let outcome = coordinator.sync(alias);
        let status = match outcome.error {
            None if registry.config(alias).replica_exists() => InitStatus::Synced,
            None => InitStatus::Failed("refresh did not create the replica".to_string()),
            Some(e) => InitStatus::Failed(e),
        };
        if let InitStatus::Failed(reason) = &status {
            warn!("[Init] '{}' could not be initialized: {}", alias, reason);
        }
        results.insert(alias, status);
    }

    results
}
