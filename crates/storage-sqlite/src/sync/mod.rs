//! Replica synchronization: refreshing local replicas from the remote,
//! validating them and persisting per-alias sync state.

pub mod bootstrap;
pub mod coordinator;
pub mod refresher;
pub mod session;
pub mod state_store;

pub use bootstrap::{init_databases, InitStatus};
pub use coordinator::{ReplicaSyncCoordinator, SyncOutcome};
pub use refresher::{CommandRefresher, ReplicaRefresher};
pub use session::SyncSession;
pub use state_store::{JsonSyncStateStore, MemorySyncStateStore, SyncStateStore};
