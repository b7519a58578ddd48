//! wcmkt-syncd: keeps the local replicas current.
//!
//! On start it syncs any replica that is missing, then wakes every poll
//! interval and syncs each alias whose scheduled time has passed.

mod settings;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use wcmkt_core::sync::{format_time_until, time_until_next_sync};
use wcmkt_core::{DatabaseAlias, DatabaseConfigTable};
use wcmkt_storage_sqlite::{
    init_databases, CommandRefresher, ConnectionRegistry, InitStatus, JsonSyncStateStore,
    ReplicaSyncCoordinator,
};

use settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let settings = Settings::from_env()?;
    let config = DatabaseConfigTable::load(&settings.secrets_path, settings.data_dir.as_deref())
        .with_context(|| format!("loading {}", settings.secrets_path.display()))?;
    let refresher = CommandRefresher::from_command_line(&settings.refresh_command)
        .context("WCMKT_REFRESH_COMMAND is empty")?;

    let registry = Arc::new(ConnectionRegistry::new(config));
    let coordinator = Arc::new(ReplicaSyncCoordinator::new(
        registry.clone(),
        Arc::new(refresher),
        Arc::new(JsonSyncStateStore::new(&settings.sync_state_path)),
    ));
    info!(
        "wcmkt-syncd starting, state in {}, polling every {}s",
        settings.sync_state_path.display(),
        settings.poll_interval.as_secs()
    );

    let init = {
        let coordinator = coordinator.clone();
        tokio::task::spawn_blocking(move || init_databases(&coordinator)).await?
    };
    for (alias, status) in &init {
        match status {
            InitStatus::Failed(reason) => warn!("{}: not initialized ({})", alias, reason),
            other => info!("{}: {:?}", alias, other),
        }
    }

    let mut ticker = tokio::time::interval(settings.poll_interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => run_due_syncs(&coordinator).await,
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!("signal handler failed: {}", e);
                }
                info!("shutdown requested");
                break;
            }
        }
    }

    tokio::task::spawn_blocking(move || registry.shutdown()).await?;
    Ok(())
}

fn init_tracing() -> Result<()> {
    tracing_log::LogTracer::init().context("installing log bridge")?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Syncs every alias whose next scheduled time has passed, one at a time.
async fn run_due_syncs(coordinator: &Arc<ReplicaSyncCoordinator>) {
    for alias in DatabaseAlias::ALL {
        match coordinator.is_due(alias, Utc::now()) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                warn!("{}: could not read sync state: {}", alias, e);
                continue;
            }
        }

        let worker = coordinator.clone();
        let outcome = match tokio::task::spawn_blocking(move || worker.sync(alias)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{}: sync task did not complete: {}", alias, e);
                continue;
            }
        };

        let next = time_until_next_sync(&outcome.state, Utc::now())
            .map(format_time_until)
            .unwrap_or_else(|| "now".to_string());
        if outcome.succeeded() {
            info!(
                "{}: synced in {}ms, next sync in {}",
                alias, outcome.duration_ms, next
            );
        } else {
            warn!(
                "{}: sync {}, next attempt in {}",
                alias,
                outcome.error.as_deref().unwrap_or("failed validation"),
                next
            );
        }
    }
}
