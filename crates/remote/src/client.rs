//! Blocking client for the remote canonical store.

use std::time::Duration;

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::{ApiRetryClass, RemoteError, Result};
use crate::retry::RetryPolicy;
use crate::types::{PipelineRequest, PipelineResponse, QueryResult};

/// Default timeout for remote requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;
const PIPELINE_PATH: &str = "/v2/pipeline";

/// Anything that can run a SQL statement against the canonical store.
///
/// The replica layer only ever talks to the remote through this trait, so
/// tests can substitute an in-process store.
pub trait RemoteStore: Send + Sync {
    fn execute(&self, sql: &str) -> Result<QueryResult>;
}

/// HTTP client for one remote database.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    headers: HeaderMap,
    retry: RetryPolicy,
}

impl RemoteClient {
    /// Create a client for `base_url` (an `http(s)://` URL) using `auth_token`.
    pub fn new(base_url: &str, auth_token: &str) -> Result<Self> {
        let base = base_url.trim().trim_end_matches('/');
        if !(base.starts_with("https://") || base.starts_with("http://")) {
            return Err(RemoteError::invalid_request(format!(
                "Remote URL must be http(s): '{}'",
                base_url
            )));
        }
        if auth_token.trim().is_empty() {
            return Err(RemoteError::auth("Missing auth token"));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", auth_token.trim()))
            .map_err(|_| RemoteError::auth("Invalid auth token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", base, PIPELINE_PATH),
            headers,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[Remote] response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[Remote] response error ({}): {}", status, preview);
    }

    fn execute_once(&self, sql: &str) -> Result<QueryResult> {
        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .json(&PipelineRequest::execute(sql))
            .send()?;

        let status = response.status();
        let body = response.text()?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(RemoteError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }

        let parsed: PipelineResponse = serde_json::from_str(&body)?;
        parsed.into_query_result()
    }
}

impl RemoteStore for RemoteClient {
    /// Runs `sql`, retrying transient failures per the client's retry policy.
    fn execute(&self, sql: &str) -> Result<QueryResult> {
        let mut attempt = 1;
        loop {
            match self.execute_once(sql) {
                Ok(result) => return Ok(result),
                Err(err)
                    if err.retry_class() == ApiRetryClass::Retryable
                        && attempt < self.retry.max_attempts =>
                {
                    let delay = self.retry.backoff_with_jitter(attempt);
                    warn!(
                        "[Remote] query failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt, self.retry.max_attempts, delay, err
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
