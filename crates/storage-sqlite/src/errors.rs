//! Storage-level errors and their mapping into the shared taxonomy.

use thiserror::Error;
use wcmkt_core::errors::{ConnectionError, DatabaseError, Error};
use wcmkt_core::DatabaseAlias;
use wcmkt_remote::{ApiRetryClass, RemoteError};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Diesel error: {0}")]
    Diesel(#[from] diesel::result::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Error::Database(DatabaseError::QueryFailed(err.to_string()))
    }
}

/// A local replica that cannot be opened.
pub(crate) fn local_unavailable(alias: DatabaseAlias, message: impl ToString) -> Error {
    Error::Connection(ConnectionError::Local {
        alias: alias.to_string(),
        message: message.to_string(),
    })
}

/// Statement rejections are query failures; everything else means the remote
/// could not be reached or would not talk to us.
pub(crate) fn remote_error(alias: DatabaseAlias, err: RemoteError) -> Error {
    match err {
        RemoteError::Statement { message, .. } => {
            Error::Database(DatabaseError::QueryFailed(message))
        }
        other => {
            let message = match other.retry_class() {
                ApiRetryClass::ReauthRequired => format!("authentication rejected: {}", other),
                _ => other.to_string(),
            };
            Error::Connection(ConnectionError::Remote {
                alias: alias.to_string(),
                message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_statement_errors_are_query_failures() {
        let err = remote_error(
            DatabaseAlias::Market,
            RemoteError::Statement {
                code: None,
                message: "no such table: marketstats".to_string(),
            },
        );
        assert!(matches!(err, Error::Database(DatabaseError::QueryFailed(_))));
    }

    #[test]
    fn remote_auth_errors_are_connection_errors() {
        let err = remote_error(DatabaseAlias::Market, RemoteError::api(401, "nope"));
        match err {
            Error::Connection(ConnectionError::Remote { alias, message }) => {
                assert_eq!(alias, "market");
                assert!(message.starts_with("authentication rejected"));
            }
            other => panic!("unexpected: {other}"),
        }
    }
}
