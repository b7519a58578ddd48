//! Core domain types for the wcmkt local replica layer.
//!
//! This crate has no database driver of its own. It defines the closed set of
//! database aliases and their configuration, the error taxonomy shared by every
//! other crate, and the sync-state/schedule model the scheduler works from.

pub mod databases;
pub mod errors;
pub mod sync;

pub use databases::{AliasConfig, DatabaseAlias, DatabaseConfigTable, Dialect};
pub use errors::{ConfigurationError, ConnectionError, DatabaseError, Error, Result};
