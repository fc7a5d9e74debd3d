use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ck_auth::{FileAccountStore, HttpTimeouts, HttpTokenProvider, ProviderConfig};
use ck_core::{LifecycleConfig, LifecycleController, LifecycleEvent};
use ck_settings::{ProviderSettings, SettingsManager};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional first argument: path to a settings file
    let manager = match std::env::args().nth(1) {
        Some(path) => SettingsManager::load_from(PathBuf::from(path)).await,
        None => SettingsManager::load_default().await,
    }
    .context("Failed to load settings")?;
    let settings = manager.settings().clone();

    init_logging(&settings.log.filter);
    info!(settings = %manager.path().display(), "credkeeper starting");

    let data_dir = match settings.storage.data_dir.clone() {
        Some(dir) => dir,
        None => FileAccountStore::default_storage_dir()?,
    };
    let store = FileAccountStore::new(&data_dir)
        .await
        .with_context(|| format!("Failed to open account store at {}", data_dir.display()))?;
    let provider = HttpTokenProvider::new(provider_config(&settings.provider))
        .context("Failed to build HTTP client")?;

    let controller = LifecycleController::new(
        LifecycleConfig::from(&settings.refresh),
        Arc::new(store),
        Arc::new(provider),
    );
    let mut events = controller.subscribe();

    controller
        .start()
        .await
        .context("Failed to start credential lifecycle")?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => report(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event subscriber lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    if let Err(e) = controller.stop().await {
        error!("Final state was not persisted: {}", e);
    }

    let snapshot = controller.snapshot();
    info!(
        accounts = snapshot.len(),
        syncable = snapshot.sync_accounts().len(),
        "credkeeper stopped"
    );
    Ok(())
}

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn provider_config(settings: &ProviderSettings) -> ProviderConfig {
    let defaults = ProviderConfig::default();
    ProviderConfig {
        http_timeouts: HttpTimeouts {
            connect: Duration::from_secs(settings.connect_timeout_secs),
            request: Duration::from_secs(settings.request_timeout_secs),
        },
        user_agent: settings.user_agent.clone().or(defaults.user_agent),
        endpoints: defaults.endpoints,
    }
}

fn report(event: &LifecycleEvent) {
    match event {
        LifecycleEvent::AccountNeedsReauth { account_id, reason } => {
            warn!(account_id = %account_id, %reason, "Sign in again to keep this account working");
        }
        LifecycleEvent::AccountSuspended { account_id, detail } => {
            warn!(account_id = %account_id, %detail, "Account suspended");
        }
        LifecycleEvent::AccountFailing {
            account_id,
            detail,
            failures,
        } => {
            error!(account_id = %account_id, failures, %detail, "Background refresh gave up");
        }
        LifecycleEvent::PersistFailed { error } => {
            warn!(%error, "Changes not persisted");
        }
        other => info!("{}", other.description()),
    }
}
