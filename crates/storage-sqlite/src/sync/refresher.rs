use std::ffi::OsString;
use std::process::Command;

use log::{debug, info};

use wcmkt_core::{Error, Result};

use super::session::SyncSession;

const MAX_STDERR_CHARS: usize = 512;

/// The external operation that replaces a replica with the remote's contents.
///
/// Treated as atomic: it either leaves a complete, newer replica at
/// `session.local_path()` or returns an error and leaves the old one.
pub trait ReplicaRefresher: Send + Sync {
    fn refresh(&self, session: &SyncSession) -> Result<()>;
}

/// Runs an external program to refresh the replica.
///
/// The program receives `WCMKT_ALIAS`, `WCMKT_DB_PATH`, `WCMKT_SYNC_URL` and
/// `WCMKT_AUTH_TOKEN` in its environment. A non-zero exit is a sync failure.
#[derive(Debug, Clone)]
pub struct CommandRefresher {
    program: OsString,
    args: Vec<OsString>,
}

impl CommandRefresher {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Splits a shell-free command line on whitespace.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(parts.fold(Self::new(program), |cmd, arg| cmd.arg(arg)))
    }
}

impl ReplicaRefresher for CommandRefresher {
    fn refresh(&self, session: &SyncSession) -> Result<()> {
        debug!(
            "[ReplicaSync] running {:?} for '{}'",
            self.program,
            session.alias()
        );
        let output = Command::new(&self.program)
            .args(&self.args)
            .env("WCMKT_ALIAS", session.alias().as_str())
            .env("WCMKT_DB_PATH", session.local_path())
            .env("WCMKT_SYNC_URL", session.sync_url())
            .env("WCMKT_AUTH_TOKEN", session.auth_token())
            .output()
            .map_err(|e| Error::sync(format!("failed to start {:?}: {}", self.program, e)))?;

        if output.status.success() {
            info!(
                "[ReplicaSync] refresh command finished for '{}'",
                session.alias()
            );
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let preview: String = stderr.trim().chars().take(MAX_STDERR_CHARS).collect();
        Err(Error::sync(format!(
            "refresh command exited with {}: {}",
            output.status, preview
        )))
    }
}
