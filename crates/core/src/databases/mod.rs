//! Database aliases and their per-alias configuration.

mod alias;
mod config;

pub use alias::{DatabaseAlias, Dialect, FreshnessMarker};
pub use config::{normalize_remote_url, AliasConfig, DatabaseConfigTable, DEFAULT_SECRETS_PATH};
