use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use log::{debug, warn};
use uuid::Uuid;

use wcmkt_core::sync::{SyncState, SyncStateRecord};
use wcmkt_core::{DatabaseAlias, Result};

/// Durable storage for per-alias [`SyncState`].
pub trait SyncStateStore: Send + Sync {
    fn load(&self, alias: DatabaseAlias) -> Result<Option<SyncState>>;

    fn save(&self, state: &SyncState) -> Result<()>;

    /// Stored state, or the never-synced state when nothing is stored yet.
    fn load_or_initial(&self, alias: DatabaseAlias) -> Result<SyncState> {
        Ok(self
            .load(alias)?
            .unwrap_or_else(|| SyncState::initial(alias)))
    }
}

/// Keeps every alias's state in one JSON document keyed by alias.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash never leaves a half-written file behind.
#[derive(Debug)]
pub struct JsonSyncStateStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

type StateDocument = BTreeMap<DatabaseAlias, SyncStateRecord>;

impl JsonSyncStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<StateDocument> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StateDocument::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&contents) {
            Ok(document) => Ok(document),
            Err(e) => {
                warn!(
                    "[SyncState] ignoring unreadable state file {}: {}",
                    self.path.display(),
                    e
                );
                Ok(StateDocument::new())
            }
        }
    }

    fn write_document(&self, document: &StateDocument) -> Result<()> {
        let json = serde_json::to_string_pretty(document)?;
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sync_state.json".to_string());
        let tmp = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&tmp, json)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

impl SyncStateStore for JsonSyncStateStore {
    fn load(&self, alias: DatabaseAlias) -> Result<Option<SyncState>> {
        Ok(self.read_document()?.remove(&alias).map(|record| record.state))
    }

    fn save(&self, state: &SyncState) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut document = self.read_document()?;
        document.insert(state.alias, SyncStateRecord::new(state.clone(), Utc::now()));
        self.write_document(&document)?;
        debug!(
            "[SyncState] saved '{}' ({}) to {}",
            state.alias,
            state.status.as_str(),
            self.path.display()
        );
        Ok(())
    }
}

/// In-process store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemorySyncStateStore {
    states: Mutex<HashMap<DatabaseAlias, SyncState>>,
}

impl MemorySyncStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncStateStore for MemorySyncStateStore {
    fn load(&self, alias: DatabaseAlias) -> Result<Option<SyncState>> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(states.get(&alias).cloned())
    }

    fn save(&self, state: &SyncState) -> Result<()> {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.insert(state.alias, state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wcmkt_core::sync::SyncStatus;

    fn state(alias: DatabaseAlias, status: SyncStatus) -> SyncState {
        SyncState {
            alias,
            last_sync: Utc.with_ymd_and_hms(2025, 6, 1, 10, 5, 0).unwrap(),
            next_scheduled_sync: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            status,
        }
    }

    #[test]
    fn missing_file_yields_initial_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSyncStateStore::new(dir.path().join("state.json"));
        assert_eq!(store.load(DatabaseAlias::Market).unwrap(), None);
        assert_eq!(
            store.load_or_initial(DatabaseAlias::Market).unwrap(),
            SyncState::initial(DatabaseAlias::Market)
        );
    }

    #[test]
    fn saves_each_alias_independently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = JsonSyncStateStore::new(&path);

        store.save(&state(DatabaseAlias::Market, SyncStatus::Success)).unwrap();
        store.save(&state(DatabaseAlias::BuildCost, SyncStatus::Failed)).unwrap();

        let reopened = JsonSyncStateStore::new(&path);
        assert_eq!(
            reopened.load(DatabaseAlias::Market).unwrap().unwrap().status,
            SyncStatus::Success
        );
        assert_eq!(
            reopened.load(DatabaseAlias::BuildCost).unwrap().unwrap().status,
            SyncStatus::Failed
        );
        assert_eq!(reopened.load(DatabaseAlias::StaticData).unwrap(), None);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["market"]["last_sync"], "2025-06-01 10:05 UTC");
        assert_eq!(raw["market"]["next_sync"], "2025-06-01 12:00 UTC");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn corrupt_file_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();
        let store = JsonSyncStateStore::new(&path);
        assert_eq!(store.load(DatabaseAlias::Market).unwrap(), None);

        store.save(&state(DatabaseAlias::Market, SyncStatus::Success)).unwrap();
        assert!(store.load(DatabaseAlias::Market).unwrap().is_some());
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemorySyncStateStore::new();
        store.save(&state(DatabaseAlias::Market, SyncStatus::Failed)).unwrap();
        assert_eq!(
            store.load(DatabaseAlias::Market).unwrap().unwrap().status,
            SyncStatus::Failed
        );
    }
}
