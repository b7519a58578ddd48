//! Error types for the remote store client.

use thiserror::Error;

/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

/// Retry policy class for remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success HTTP status from the remote
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The statement itself was rejected by the remote
    #[error("Statement failed: {message}")]
    Statement {
        code: Option<String>,
        message: String,
    },

    /// Invalid request (bad URL, malformed response, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication error (missing or invalid token)
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl RemoteError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> ApiRetryClass {
        match self {
            Self::Api { status, .. } => match *status {
                401 | 403 => ApiRetryClass::ReauthRequired,
                408 | 409 | 423 | 425 | 429 => ApiRetryClass::Retryable,
                500..=599 => ApiRetryClass::Retryable,
                _ => ApiRetryClass::Permanent,
            },
            Self::Http(err) => {
                if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
                    ApiRetryClass::Retryable
                } else {
                    ApiRetryClass::Permanent
                }
            }
            Self::Json(_) => ApiRetryClass::Permanent,
            Self::Statement { .. } => ApiRetryClass::Permanent,
            Self::InvalidRequest(_) => ApiRetryClass::Permanent,
            Self::Auth(_) => ApiRetryClass::ReauthRequired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_class_for_status_codes() {
        assert_eq!(
            RemoteError::api(503, "unavailable").retry_class(),
            ApiRetryClass::Retryable
        );
        assert_eq!(
            RemoteError::api(429, "slow down").retry_class(),
            ApiRetryClass::Retryable
        );
        assert_eq!(
            RemoteError::api(401, "unauthorized").retry_class(),
            ApiRetryClass::ReauthRequired
        );
        assert_eq!(
            RemoteError::api(400, "bad request").retry_class(),
            ApiRetryClass::Permanent
        );
    }

    #[test]
    fn statement_error_is_permanent() {
        let err = RemoteError::Statement {
            code: Some("SQLITE_ERROR".to_string()),
            message: "no such table: marketstats".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Statement failed: no such table: marketstats"
        );
        assert_eq!(err.retry_class(), ApiRetryClass::Permanent);
    }
}
