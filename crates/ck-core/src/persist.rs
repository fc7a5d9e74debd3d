use std::sync::Arc;

use ck_auth::AccountStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::events::{EventBroadcaster, LifecycleEvent};
use crate::registry::RegistrySnapshot;

/// Background task writing registry snapshots to storage
///
/// Rapid writes coalesce: only the latest snapshot is saved once the previous
/// save finishes. Failures are logged and published, never retried here; the
/// next registry write or the final flush picks the state up again.
#[derive(Debug)]
pub struct Persister {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Persister {
    pub fn spawn(
        store: Arc<dyn AccountStore>,
        mut rx: watch::Receiver<Arc<RegistrySnapshot>>,
        events: EventBroadcaster,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let snapshot = rx.borrow_and_update().clone();
                // Already logged and published; the next write retries
                let _ = save_snapshot(store.as_ref(), &snapshot, &events).await;
            }
            debug!("Persister stopped");
        });

        Self { cancel, handle }
    }

    /// Stop the task, letting a save already in progress finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("Persister task ended abnormally: {}", e);
        }
    }
}

/// Save `snapshot`, publishing `PersistFailed` on error
pub async fn save_snapshot(
    store: &dyn AccountStore,
    snapshot: &RegistrySnapshot,
    events: &EventBroadcaster,
) -> ck_auth::Result<()> {
    match store.save(&snapshot.to_accounts()).await {
        Ok(()) => {
            debug!(version = snapshot.version(), "Persisted accounts");
            Ok(())
        }
        Err(e) => {
            warn!(version = snapshot.version(), "Failed to persist accounts: {}", e);
            events.publish(LifecycleEvent::PersistFailed {
                error: e.to_string(),
            });
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AccountRegistry;
    use ck_auth::{Account, CkAuthError, MemoryAccountStore};
    use std::time::Duration;

    struct BrokenStore;

    #[async_trait::async_trait]
    impl AccountStore for BrokenStore {
        async fn load(&self) -> ck_auth::Result<Vec<Account>> {
            Ok(Vec::new())
        }

        async fn save(&self, _accounts: &[Account]) -> ck_auth::Result<()> {
            Err(CkAuthError::Unavailable("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn test_registry_writes_reach_storage() {
        let registry = AccountRegistry::new();
        let store = MemoryAccountStore::new();
        let persister = Persister::spawn(
            Arc::new(store.clone()),
            registry.subscribe_persist(),
            EventBroadcaster::new(),
        );

        registry.upsert(Account::new("a@example.com", None));
        registry.upsert(Account::new("b@example.com", None));

        for _ in 0..100 {
            if store.accounts().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        persister.shutdown().await;

        assert_eq!(store.accounts().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_save_is_published() {
        let registry = AccountRegistry::new();
        let events = EventBroadcaster::new();
        let mut rx = events.subscribe();
        let persister = Persister::spawn(
            Arc::new(BrokenStore),
            registry.subscribe_persist(),
            events.clone(),
        );

        registry.upsert(Account::new("a@example.com", None));

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, LifecycleEvent::PersistFailed { .. }));
        // Memory state is untouched by the failure
        assert_eq!(registry.snapshot().len(), 1);

        persister.shutdown().await;
    }
}
