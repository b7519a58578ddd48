use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use wcmkt_core::databases::DEFAULT_SECRETS_PATH;

pub const DEFAULT_SYNC_STATE_PATH: &str = "last_sync_state.json";
pub const DEFAULT_POLL_SECS: u64 = 60;

/// Process settings, read from `WCMKT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub secrets_path: PathBuf,
    pub data_dir: Option<PathBuf>,
    pub sync_state_path: PathBuf,
    pub refresh_command: String,
    pub poll_interval: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let refresh_command = non_empty("WCMKT_REFRESH_COMMAND")
            .ok_or_else(|| anyhow!("WCMKT_REFRESH_COMMAND must name the replica refresh command"))?;
        let poll_secs = match non_empty("WCMKT_POLL_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("WCMKT_POLL_SECS is not a number: {}", raw))?,
            None => DEFAULT_POLL_SECS,
        };
        if poll_secs == 0 {
            return Err(anyhow!("WCMKT_POLL_SECS must be at least 1"));
        }

        Ok(Self {
            secrets_path: non_empty("WCMKT_SECRETS")
                .unwrap_or_else(|| DEFAULT_SECRETS_PATH.to_string())
                .into(),
            data_dir: non_empty("WCMKT_DATA_DIR").map(PathBuf::from),
            sync_state_path: non_empty("WCMKT_SYNC_STATE")
                .unwrap_or_else(|| DEFAULT_SYNC_STATE_PATH.to_string())
                .into(),
            refresh_command,
            poll_interval: Duration::from_secs(poll_secs),
        })
    }
}
