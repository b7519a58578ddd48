//! Per-alias cache of live connections, plus the lock table that guards them.

pub(crate) mod introspection;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};

use wcmkt_core::{AliasConfig, DatabaseAlias, DatabaseConfigTable, Result};
use wcmkt_remote::{RemoteClient, RemoteStore, RetryPolicy};

use crate::access::{AccessGuard, AccessMode};
use crate::db::{create_pool, open_raw, DbPool};
use crate::errors::{local_unavailable, remote_error};
use crate::lock::{LockRegistry, LockSnapshot};
use crate::sync::SyncSession;

pub use introspection::{parse_timestamp, ColumnInfo, TableColumns};

/// Which connection to a database a handle represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConnectionKind {
    /// Diesel pool over the local replica file.
    Local,
    /// Client for the remote canonical store.
    Remote,
    /// Session handed to the refresher while a sync runs.
    Sync,
    /// Plain rusqlite connection for catalog introspection.
    Raw,
}

impl ConnectionKind {
    pub const ALL: [ConnectionKind; 4] = [
        ConnectionKind::Local,
        ConnectionKind::Remote,
        ConnectionKind::Sync,
        ConnectionKind::Raw,
    ];
}

/// A cached connection. Cloning shares the underlying connection.
#[derive(Clone)]
pub(crate) enum ConnectionHandle {
    Local(Arc<DbPool>),
    Remote(Arc<dyn RemoteStore>),
    Sync(Arc<SyncSession>),
    Raw(Arc<Mutex<rusqlite::Connection>>),
}

impl ConnectionHandle {
    pub fn kind(&self) -> ConnectionKind {
        match self {
            ConnectionHandle::Local(_) => ConnectionKind::Local,
            ConnectionHandle::Remote(_) => ConnectionKind::Remote,
            ConnectionHandle::Sync(_) => ConnectionKind::Sync,
            ConnectionHandle::Raw(_) => ConnectionKind::Raw,
        }
    }

    /// True when both handles point at the same underlying connection.
    #[cfg(test)]
    pub fn same_as(&self, other: &ConnectionHandle) -> bool {
        match (self, other) {
            (ConnectionHandle::Local(a), ConnectionHandle::Local(b)) => Arc::ptr_eq(a, b),
            (ConnectionHandle::Remote(a), ConnectionHandle::Remote(b)) => Arc::ptr_eq(a, b),
            (ConnectionHandle::Sync(a), ConnectionHandle::Sync(b)) => Arc::ptr_eq(a, b),
            (ConnectionHandle::Raw(a), ConnectionHandle::Raw(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionHandle::{:?}", self.kind())
    }
}

/// Opens remote connections. Swapped out in tests.
pub trait RemoteConnector: Send + Sync {
    fn connect(&self, config: &AliasConfig) -> wcmkt_remote::Result<Arc<dyn RemoteStore>>;
}

/// Connects over HTTP with the configured retry policy.
#[derive(Debug, Clone, Default)]
pub struct HttpRemoteConnector {
    retry: RetryPolicy,
}

impl HttpRemoteConnector {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }
}

impl RemoteConnector for HttpRemoteConnector {
    fn connect(&self, config: &AliasConfig) -> wcmkt_remote::Result<Arc<dyn RemoteStore>> {
        let client = RemoteClient::new(&config.remote_http_url(), &config.auth_token)?
            .with_retry_policy(self.retry);
        Ok(Arc::new(client))
    }
}

type HandleMap = HashMap<(DatabaseAlias, ConnectionKind), ConnectionHandle>;

/// Resolves aliases and memoizes one handle per (alias, kind).
///
/// Construct once at startup and share as `Arc`. Handles are only reachable
/// through an [`AccessGuard`], which holds the alias lock for as long as the
/// caller uses them.
pub struct ConnectionRegistry {
    config: DatabaseConfigTable,
    locks: LockRegistry,
    handles: Mutex<HandleMap>,
    connector: Arc<dyn RemoteConnector>,
}

impl ConnectionRegistry {
    pub fn new(config: DatabaseConfigTable) -> Self {
        Self::with_remote_connector(config, Arc::new(HttpRemoteConnector::default()))
    }

    pub fn with_remote_connector(
        config: DatabaseConfigTable,
        connector: Arc<dyn RemoteConnector>,
    ) -> Self {
        Self {
            config,
            locks: LockRegistry::new(),
            handles: Mutex::new(HashMap::new()),
            connector,
        }
    }

    fn handles(&self) -> MutexGuard<'_, HandleMap> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolves an alias name (legacy names included) to its configuration.
    /// Never opens a connection.
    pub fn resolve(&self, name: &str) -> Result<&AliasConfig> {
        self.config.resolve(name)
    }

    pub fn config(&self, alias: DatabaseAlias) -> &AliasConfig {
        self.config.get(alias)
    }

    pub fn config_table(&self) -> &DatabaseConfigTable {
        &self.config
    }

    pub fn lock_snapshot(&self, alias: DatabaseAlias) -> LockSnapshot {
        self.locks.snapshot(alias)
    }

    pub(crate) fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    /// Kinds currently cached for `alias`.
    pub fn cached_kinds(&self, alias: DatabaseAlias) -> Vec<ConnectionKind> {
        let mut kinds: Vec<_> = self
            .handles()
            .keys()
            .filter(|(a, _)| *a == alias)
            .map(|(_, kind)| *kind)
            .collect();
        kinds.sort();
        kinds
    }

    /// Returns the cached handle, creating it on first use. Callers reach this
    /// through an [`AccessGuard`] so the alias lock is always held.
    ///
    /// The map is not locked while connecting, so a slow remote for one alias
    /// never stalls lookups for another.
    pub(crate) fn get(&self, alias: DatabaseAlias, kind: ConnectionKind) -> Result<ConnectionHandle> {
        if let Some(handle) = self.handles().get(&(alias, kind)) {
            return Ok(handle.clone());
        }

        let opened = self.open(alias, kind)?;
        let mut handles = self.handles();
        // Two readers of one alias may race to open; the first insert wins.
        let handle = handles.entry((alias, kind)).or_insert(opened).clone();
        drop(handles);
        debug!("[ConnectionRegistry] opened {:?} handle for '{}'", kind, alias);
        Ok(handle)
    }

    fn open(&self, alias: DatabaseAlias, kind: ConnectionKind) -> Result<ConnectionHandle> {
        let config = self.config(alias);
        match kind {
            ConnectionKind::Local => {
                ensure_replica(config)?;
                let pool = create_pool(&config.local_path)
                    .map_err(|e| local_unavailable(alias, e))?;
                Ok(ConnectionHandle::Local(pool))
            }
            ConnectionKind::Raw => {
                ensure_replica(config)?;
                let conn = open_raw(&config.local_path).map_err(|e| local_unavailable(alias, e))?;
                Ok(ConnectionHandle::Raw(Arc::new(Mutex::new(conn))))
            }
            ConnectionKind::Remote => {
                let remote = self
                    .connector
                    .connect(config)
                    .map_err(|e| remote_error(alias, e))?;
                Ok(ConnectionHandle::Remote(remote))
            }
            ConnectionKind::Sync => {
                let remote = self
                    .connector
                    .connect(config)
                    .map_err(|e| remote_error(alias, e))?;
                Ok(ConnectionHandle::Sync(Arc::new(SyncSession::new(
                    config.clone(),
                    remote,
                ))))
            }
        }
    }

    /// Drops every cached handle for `alias`. Caller must hold write access.
    pub(crate) fn dispose_handles(&self, alias: DatabaseAlias) -> usize {
        let disposed: Vec<ConnectionHandle> = {
            let mut handles = self.handles();
            let keys: Vec<_> = handles.keys().filter(|(a, _)| *a == alias).copied().collect();
            keys.iter().filter_map(|key| handles.remove(key)).collect()
        };
        let count = disposed.len();
        // Pools and connections close as the last references drop here.
        drop(disposed);
        if count > 0 {
            debug!("[ConnectionRegistry] disposed {} handle(s) for '{}'", count, alias);
        }
        count
    }

    /// Takes write access to `alias` and disposes its cached handles.
    pub fn invalidate(&self, alias: DatabaseAlias) -> usize {
        let access = self.access(alias, AccessMode::Write);
        self.dispose_handles(access.alias())
    }

    /// Blocks until access is granted.
    pub fn access(&self, alias: DatabaseAlias, mode: AccessMode) -> AccessGuard<'_> {
        AccessGuard::acquire(self, alias, mode)
    }

    /// Bounded-wait variant of [`access`](Self::access); fails with `Error::Timeout`.
    pub fn access_timeout(
        &self,
        alias: DatabaseAlias,
        mode: AccessMode,
        timeout: Duration,
    ) -> Result<AccessGuard<'_>> {
        AccessGuard::try_acquire(self, alias, mode, timeout)
    }

    /// Runs `body` under read (`write == false`) or write access to `alias`.
    /// The lock is released when `body` returns, fails or panics.
    ///
    /// Connections borrow from the guard, so they cannot be returned out of
    /// `body` and used after the lock is gone:
    ///
    /// ```compile_fail
    /// use wcmkt_core::DatabaseAlias;
    /// use wcmkt_storage_sqlite::ConnectionRegistry;
    ///
    /// fn leak(registry: &ConnectionRegistry) {
    ///     let conn = registry.with_access(DatabaseAlias::Market, false, |access| access.connection());
    ///     drop(conn);
    /// }
    /// ```
    pub fn with_access<T, F>(&self, alias: DatabaseAlias, write: bool, body: F) -> Result<T>
    where
        F: FnOnce(&AccessGuard<'_>) -> Result<T>,
    {
        let access = self.access(alias, AccessMode::from_write(write));
        body(&access)
    }

    pub fn list_tables(&self, alias: DatabaseAlias, local: bool) -> Result<Vec<String>> {
        self.with_access(alias, false, |access| access.list_tables(local))
    }

    pub fn describe_table(
        &self,
        alias: DatabaseAlias,
        table: &str,
        local: bool,
        detailed: bool,
    ) -> Result<TableColumns> {
        self.with_access(alias, false, |access| {
            access.describe_table(table, local, detailed)
        })
    }

    pub fn most_recent_update(
        &self,
        alias: DatabaseAlias,
        table: &str,
        local: bool,
    ) -> Result<Option<DateTime<Utc>>> {
        self.with_access(alias, false, |access| access.most_recent_update(table, local))
    }

    /// Disposes every handle, taking each alias's write lock in turn.
    pub fn shutdown(&self) {
        let mut total = 0;
        for alias in DatabaseAlias::ALL {
            total += self.invalidate(alias);
        }
        info!("[ConnectionRegistry] shut down, {} handle(s) closed", total);
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("config", &self.config)
            .field("cached", &self.handles().len())
            .finish()
    }
}

fn ensure_replica(config: &AliasConfig) -> Result<()> {
    if config.replica_exists() {
        return Ok(());
    }
    Err(local_unavailable(
        config.alias,
        format!("replica file missing: {}", config.local_path.display()),
    ))
}
