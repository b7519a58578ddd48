//! Sync state, schedule and freshness models used by the sync coordinator
//! and the scheduler.

mod schedule;
mod sync_state_model;
mod update_status;

pub use schedule::*;
pub use sync_state_model::*;
pub use update_status::*;
