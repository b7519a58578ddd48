//! Scoped access to one alias's replica.
//!
//! An [`AccessGuard`] is the only way to reach a cached connection. It holds
//! the alias's read or write lock from creation until drop, so the lock is
//! released on every exit path of the code using it, including `?` returns
//! and panics.

use std::cell::OnceCell;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use diesel::sqlite::SqliteConnection;

use wcmkt_core::databases::FreshnessMarker;
use wcmkt_core::errors::DatabaseError;
use wcmkt_core::{AliasConfig, DatabaseAlias, Error, Result};
use wcmkt_remote::RemoteStore;

use crate::db::{get_connection, DbConnection, DbPool};
use crate::lock::ReaderWriterLock;
use crate::registry::introspection;
use crate::registry::{ConnectionHandle, ConnectionKind, ConnectionRegistry, TableColumns};
use crate::sync::SyncSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    Write,
}

impl AccessMode {
    pub fn from_write(write: bool) -> Self {
        if write {
            AccessMode::Write
        } else {
            AccessMode::Read
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
        }
    }
}

/// Read or write access to one alias, held until drop.
///
/// Connections handed out by the guard borrow from it, so none of them can
/// outlive the lock. In particular nothing obtained here can be used while a
/// sync holds the alias.
pub struct AccessGuard<'r> {
    registry: &'r ConnectionRegistry,
    alias: DatabaseAlias,
    mode: AccessMode,
    lock: Arc<ReaderWriterLock>,
    local: OnceCell<Arc<DbPool>>,
    remote: OnceCell<Arc<dyn RemoteStore>>,
    raw: OnceCell<Arc<Mutex<rusqlite::Connection>>>,
    session: OnceCell<Arc<SyncSession>>,
}

impl<'r> AccessGuard<'r> {
    fn held(
        registry: &'r ConnectionRegistry,
        alias: DatabaseAlias,
        mode: AccessMode,
        lock: Arc<ReaderWriterLock>,
    ) -> Self {
        Self {
            registry,
            alias,
            mode,
            lock,
            local: OnceCell::new(),
            remote: OnceCell::new(),
            raw: OnceCell::new(),
            session: OnceCell::new(),
        }
    }

    pub(crate) fn acquire(
        registry: &'r ConnectionRegistry,
        alias: DatabaseAlias,
        mode: AccessMode,
    ) -> Self {
        let lock = registry.locks().lock_for(alias);
        match mode {
            AccessMode::Read => lock.acquire_read(),
            AccessMode::Write => lock.acquire_write(),
        }
        Self::held(registry, alias, mode, lock)
    }

    pub(crate) fn try_acquire(
        registry: &'r ConnectionRegistry,
        alias: DatabaseAlias,
        mode: AccessMode,
        timeout: Duration,
    ) -> Result<Self> {
        let started = Instant::now();
        let lock = registry.locks().lock_for(alias);
        let acquired = match mode {
            AccessMode::Read => lock.try_acquire_read_for(timeout),
            AccessMode::Write => lock.try_acquire_write_for(timeout),
        };
        if !acquired {
            return Err(Error::Timeout {
                alias: alias.to_string(),
                mode: mode.as_str(),
                waited_ms: started.elapsed().as_millis(),
            });
        }
        Ok(Self::held(registry, alias, mode, lock))
    }

    pub fn alias(&self) -> DatabaseAlias {
        self.alias
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn config(&self) -> &AliasConfig {
        self.registry.config(self.alias)
    }

    /// The registry's cached handle of `kind`, opened on first use. The sync
    /// kind is only handed out under write access.
    pub(crate) fn handle(&self, kind: ConnectionKind) -> Result<ConnectionHandle> {
        if kind == ConnectionKind::Sync && self.mode != AccessMode::Write {
            return Err(Error::Database(DatabaseError::Internal(format!(
                "Sync session for '{}' requires write access",
                self.alias
            ))));
        }
        self.registry.get(self.alias, kind)
    }

    fn cached<'s, T>(
        &'s self,
        cell: &'s OnceCell<T>,
        kind: ConnectionKind,
        extract: impl FnOnce(ConnectionHandle) -> Option<T>,
    ) -> Result<&'s T> {
        if let Some(value) = cell.get() {
            return Ok(value);
        }
        let handle = self.handle(kind)?;
        let actual = handle.kind();
        let value = extract(handle).ok_or_else(|| wrong_kind(kind, actual))?;
        Ok(cell.get_or_init(|| value))
    }

    pub(crate) fn local(&self) -> Result<&DbPool> {
        let pool = self.cached(&self.local, ConnectionKind::Local, |handle| match handle {
            ConnectionHandle::Local(pool) => Some(pool),
            _ => None,
        })?;
        Ok(&**pool)
    }

    /// A pooled diesel connection to the local replica, valid while the
    /// guard is held.
    pub fn connection(&self) -> Result<GuardedConnection<'_>> {
        let conn = get_connection(self.local()?)?;
        Ok(GuardedConnection {
            conn,
            _guard: PhantomData,
        })
    }

    /// Client for the remote canonical store.
    pub fn remote(&self) -> Result<&dyn RemoteStore> {
        let remote = self.cached(&self.remote, ConnectionKind::Remote, |handle| match handle {
            ConnectionHandle::Remote(remote) => Some(remote),
            _ => None,
        })?;
        Ok(&**remote)
    }

    /// The plain rusqlite connection used for catalog queries.
    pub fn raw(&self) -> Result<MutexGuard<'_, rusqlite::Connection>> {
        let raw = self.cached(&self.raw, ConnectionKind::Raw, |handle| match handle {
            ConnectionHandle::Raw(conn) => Some(conn),
            _ => None,
        })?;
        Ok(raw.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn sync_session(&self) -> Result<&SyncSession> {
        let session = self.cached(&self.session, ConnectionKind::Sync, |handle| match handle {
            ConnectionHandle::Sync(session) => Some(session),
            _ => None,
        })?;
        Ok(&**session)
    }

    /// Drops this guard's handles and the registry's cached ones for the alias.
    pub(crate) fn dispose(&mut self) -> usize {
        self.local.take();
        self.remote.take();
        self.raw.take();
        self.session.take();
        self.registry.dispose_handles(self.alias)
    }

    /// Disposes every cached handle for this alias. Write access only.
    pub fn invalidate(&mut self) -> Result<usize> {
        if self.mode != AccessMode::Write {
            return Err(Error::Database(DatabaseError::Internal(format!(
                "Invalidating '{}' requires write access",
                self.alias
            ))));
        }
        Ok(self.dispose())
    }

    /// User tables in catalog order, from the replica or the remote.
    pub fn list_tables(&self, local: bool) -> Result<Vec<String>> {
        if local {
            introspection::list_tables_local(&*self.raw()?)
        } else {
            introspection::list_tables_remote(self.alias, self.remote()?)
        }
    }

    pub fn describe_table(&self, table: &str, local: bool, detailed: bool) -> Result<TableColumns> {
        if local {
            introspection::describe_table_local(&*self.raw()?, table, detailed)
        } else {
            introspection::describe_table_remote(self.alias, self.remote()?, table, detailed)
        }
    }

    /// Current value of `marker` as text; `None` when the table is empty.
    pub fn freshness(&self, marker: &FreshnessMarker, local: bool) -> Result<Option<String>> {
        let sql = marker.query();
        if local {
            let mut conn = self.connection()?;
            introspection::scalar_text_local(&mut conn, &sql)
        } else {
            introspection::scalar_text_remote(self.alias, self.remote()?, &sql)
        }
    }

    /// Newest `updatelog` timestamp recorded for `table`.
    pub fn most_recent_update(&self, table: &str, local: bool) -> Result<Option<DateTime<Utc>>> {
        if local {
            let mut conn = self.connection()?;
            introspection::most_recent_update_local(&mut conn, table)
        } else {
            introspection::most_recent_update_remote(self.alias, self.remote()?, table)
        }
    }
}

/// A pooled connection borrowed from an [`AccessGuard`].
pub struct GuardedConnection<'g> {
    conn: DbConnection,
    _guard: PhantomData<&'g ()>,
}

impl Deref for GuardedConnection<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        &self.conn
    }
}

impl DerefMut for GuardedConnection<'_> {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }
}

impl Drop for AccessGuard<'_> {
    fn drop(&mut self) {
        match self.mode {
            AccessMode::Read => self.lock.release_read(),
            AccessMode::Write => self.lock.release_write(),
        }
    }
}

impl std::fmt::Debug for AccessGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGuard")
            .field("alias", &self.alias)
            .field("mode", &self.mode)
            .finish()
    }
}

fn wrong_kind(expected: ConnectionKind, actual: ConnectionKind) -> Error {
    Error::Database(DatabaseError::Internal(format!(
        "Expected {:?} handle, registry returned {:?}",
        expected, actual
    )))
}
