//! SQLite-backed local replicas for the wcmkt databases.
//!
//! Every query goes through [`ConnectionRegistry::with_access`] (or an
//! [`AccessGuard`]), which holds the alias's reader/writer lock for the
//! duration. [`ReplicaSyncCoordinator`] takes the write lock to replace a
//! replica and records the outcome.

pub mod access;
pub mod db;
pub mod errors;
pub mod lock;
pub mod registry;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use access::{AccessGuard, AccessMode};
pub use errors::StorageError;
pub use lock::{LockRegistry, LockSnapshot, ReadGuard, ReaderWriterLock, WriteGuard};
pub use registry::{
    ColumnInfo, ConnectionKind, ConnectionRegistry, HttpRemoteConnector,
    RemoteConnector, TableColumns,
};
pub use sync::{
    init_databases, CommandRefresher, InitStatus, JsonSyncStateStore, MemorySyncStateStore,
    ReplicaRefresher, ReplicaSyncCoordinator, SyncOutcome, SyncSession, SyncStateStore,
};
