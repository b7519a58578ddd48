use std::path::Path;
use std::sync::Arc;

use wcmkt_core::{AliasConfig, DatabaseAlias};
use wcmkt_remote::RemoteStore;

/// Everything a refresher needs to bring one replica up to date.
///
/// Only created under write access and disposed together with the alias's
/// other handles once the sync finishes.
pub struct SyncSession {
    config: AliasConfig,
    remote: Arc<dyn RemoteStore>,
}

impl SyncSession {
    pub(crate) fn new(config: AliasConfig, remote: Arc<dyn RemoteStore>) -> Self {
        Self { config, remote }
    }

    pub fn alias(&self) -> DatabaseAlias {
        self.config.alias
    }

    pub fn config(&self) -> &AliasConfig {
        &self.config
    }

    /// Replica file being replaced.
    pub fn local_path(&self) -> &Path {
        &self.config.local_path
    }

    pub fn sync_url(&self) -> &str {
        &self.config.remote_url
    }

    pub fn auth_token(&self) -> &str {
        &self.config.auth_token
    }

    pub fn remote(&self) -> &dyn RemoteStore {
        self.remote.as_ref()
    }
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("config", &self.config)
            .finish()
    }
}
