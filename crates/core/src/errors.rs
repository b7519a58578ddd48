//! Error taxonomy shared across the wcmkt crates.

use thiserror::Error;

/// Result type alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Unknown alias or missing configuration. Not recoverable by retry.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Local file or remote network connection failure.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Query or statement failure against an open connection.
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// The replica refresh failed. Absorbed by the sync coordinator.
    #[error("Sync error: {0}")]
    Sync(String),

    /// Lock acquisition did not complete within the requested bound.
    #[error("Timed out after {waited_ms} ms waiting for {mode} access to '{alias}'")]
    Timeout {
        alias: String,
        mode: &'static str,
        waited_ms: u128,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn sync(message: impl Into<String>) -> Self {
        Self::Sync(message.into())
    }

    /// True for errors the caller may reasonably retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout { .. })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Unknown database alias '{alias}'. Available: {available}")]
    UnknownAlias { alias: String, available: String },

    #[error("Missing required field '{field}' for alias '{alias}'")]
    MissingField { alias: String, field: String },

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("Unable to read configuration: {0}")]
    Unreadable(String),
}

impl ConfigurationError {
    pub fn missing_field(alias: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            alias: alias.into(),
            field: field.into(),
        }
    }

    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Local replica '{alias}' unavailable: {message}")]
    Local { alias: String, message: String },

    #[error("Remote store for '{alias}' unavailable: {message}")]
    Remote { alias: String, message: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Unexpected result shape: {0}")]
    UnexpectedShape(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
