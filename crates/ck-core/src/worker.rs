use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ck_auth::{CheckOutcome, Credential, Failure, RefreshOutcome, TokenProvider};
use futures::FutureExt;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::generation::TaskKind;

/// What caused a task to be submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    Retry,
    Manual,
}

/// A unit of provider work for one account
#[derive(Debug, Clone)]
pub struct RefreshTask {
    pub account_id: String,
    pub generation: u64,
    pub requested_at: DateTime<Utc>,
    pub kind: TaskKind,
    pub trigger: Trigger,
    pub credential: Credential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutput {
    Refresh(RefreshOutcome),
    Check(CheckOutcome),
}

impl TaskOutput {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Refresh(_) => TaskKind::Refresh,
            Self::Check(_) => TaskKind::Check,
        }
    }
}

/// Result of a task, tagged with the generation it was issued under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub account_id: String,
    pub generation: u64,
    pub output: TaskOutput,
}

/// Bounded pool running provider calls off the scheduler's path
///
/// Concurrency across accounts is capped by a semaphore; results are sent back
/// over a channel for reconciliation.
pub struct WorkerPool {
    provider: Arc<dyn TokenProvider>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<TaskResult>,
}

impl WorkerPool {
    pub fn new(
        provider: Arc<dyn TokenProvider>,
        size: usize,
        tx: mpsc::UnboundedSender<TaskResult>,
    ) -> Self {
        Self {
            provider,
            permits: Arc::new(Semaphore::new(size.max(1))),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            tx,
        }
    }

    /// Queue a task; `false` once the pool is closed
    pub fn submit(&self, task: RefreshTask) -> bool {
        if self.tracker.is_closed() {
            return false;
        }

        let provider = self.provider.clone();
        let permits = self.permits.clone();
        let cancel = self.cancel.clone();
        let tx = self.tx.clone();
        let span = info_span!(
            "provider_task",
            account_id = %task.account_id,
            generation = task.generation,
            kind = ?task.kind,
            trigger = ?task.trigger,
        );

        self.tracker.spawn(
            async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return,
                    permit = permits.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };

                let waited = Utc::now() - task.requested_at;
                debug!(waited_ms = waited.num_milliseconds(), "Calling provider");

                let output = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Provider call cancelled");
                        return;
                    }
                    output = run(provider.as_ref(), &task) => output,
                };

                let _ = tx.send(TaskResult {
                    account_id: task.account_id,
                    generation: task.generation,
                    output,
                });
            }
            .instrument(span),
        );

        true
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Refuse new tasks and cancel running ones without waiting
    pub fn abort(&self) {
        self.tracker.close();
        self.cancel.cancel();
    }

    /// Refuse new tasks and wait up to `grace` for running ones
    ///
    /// Tasks still running after the grace period are cancelled and their
    /// results never delivered. Returns `true` if everything finished in time.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tracker.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            return true;
        }

        warn!(
            remaining = self.tracker.len(),
            "Shutdown grace period elapsed, cancelling provider calls"
        );
        self.cancel.cancel();
        self.tracker.wait().await;
        false
    }
}

/// Run the provider call; a panic comes back as an `Unknown` failure
async fn run(provider: &dyn TokenProvider, task: &RefreshTask) -> TaskOutput {
    let call = async {
        match task.kind {
            TaskKind::Refresh => TaskOutput::Refresh(provider.refresh(&task.credential).await),
            TaskKind::Check => TaskOutput::Check(provider.check(&task.credential).await),
        }
    };

    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(output) => output,
        Err(payload) => {
            let detail = format!("provider panicked: {}", panic_message(payload.as_ref()));
            error!(%detail, "Provider call panicked");
            let failure = Failure::Unknown(detail);
            match task.kind {
                TaskKind::Refresh => TaskOutput::Refresh(RefreshOutcome::Failed(failure)),
                TaskKind::Check => TaskOutput::Check(CheckOutcome::Failed(failure)),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("no message")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ck_auth::AuthMethod;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct SlowProvider {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TokenProvider for SlowProvider {
        async fn refresh(&self, credential: &Credential) -> RefreshOutcome {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            let mut refreshed = credential.clone();
            refreshed.expires_at += chrono::Duration::hours(1);
            RefreshOutcome::Refreshed(refreshed)
        }

        async fn check(&self, _credential: &Credential) -> CheckOutcome {
            CheckOutcome::Failed(Failure::Transient("offline".to_string()))
        }
    }

    fn task(account_id: &str, generation: u64, kind: TaskKind) -> RefreshTask {
        RefreshTask {
            account_id: account_id.to_string(),
            generation,
            requested_at: Utc::now(),
            kind,
            trigger: Trigger::Manual,
            credential: Credential {
                access_token: "access".to_string(),
                refresh_token: "refresh".to_string(),
                client_id: None,
                client_secret: None,
                region: "us-east-1".to_string(),
                provider: None,
                auth_method: AuthMethod::Social,
                profile_arn: None,
                expires_at: Utc::now(),
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_size_caps_concurrency() {
        let provider = Arc::new(SlowProvider::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::new(provider.clone(), 2, tx);

        for i in 0..5 {
            assert!(pool.submit(task(&format!("account-{i}"), i, TaskKind::Refresh)));
        }

        let mut received = Vec::new();
        for _ in 0..5 {
            received.push(rx.recv().await.unwrap());
        }

        assert_eq!(provider.peak.load(Ordering::SeqCst), 2);
        assert!(received
            .iter()
            .all(|r| matches!(r.output, TaskOutput::Refresh(RefreshOutcome::Refreshed(_)))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_tasks_call_check() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::new(Arc::new(SlowProvider::default()), 1, tx);

        pool.submit(task("a", 7, TaskKind::Check));
        let result = rx.recv().await.unwrap();

        assert_eq!(result.generation, 7);
        assert_eq!(
            result.output,
            TaskOutput::Check(CheckOutcome::Failed(Failure::Transient(
                "offline".to_string()
            )))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_within_grace() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::new(Arc::new(SlowProvider::default()), 1, tx);

        pool.submit(task("a", 1, TaskKind::Refresh));
        assert!(pool.drain(Duration::from_secs(5)).await);
        assert!(rx.try_recv().is_ok());
        assert!(!pool.submit(task("a", 2, TaskKind::Refresh)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_cancels_after_grace() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::new(Arc::new(SlowProvider::default()), 1, tx);

        pool.submit(task("a", 1, TaskKind::Refresh));
        assert!(!pool.drain(Duration::from_millis(100)).await);
        assert_eq!(pool.in_flight(), 0);
        assert!(rx.try_recv().is_err());
    }

    struct PanickingProvider;

    #[async_trait::async_trait]
    impl TokenProvider for PanickingProvider {
        async fn refresh(&self, _credential: &Credential) -> RefreshOutcome {
            panic!("token endpoint returned garbage")
        }

        async fn check(&self, _credential: &Credential) -> CheckOutcome {
            panic!("usage endpoint returned garbage")
        }
    }

    #[tokio::test]
    async fn test_panicking_provider_reports_unknown_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::new(Arc::new(PanickingProvider), 1, tx);

        pool.submit(task("a", 3, TaskKind::Refresh));
        pool.submit(task("b", 4, TaskKind::Check));

        let refresh = rx.recv().await.unwrap();
        assert_eq!(refresh.generation, 3);
        match refresh.output {
            TaskOutput::Refresh(RefreshOutcome::Failed(Failure::Unknown(detail))) => {
                assert!(detail.contains("token endpoint returned garbage"));
            }
            other => panic!("unexpected output {other:?}"),
        }

        let check = rx.recv().await.unwrap();
        assert!(matches!(
            check.output,
            TaskOutput::Check(CheckOutcome::Failed(Failure::Unknown(_)))
        ));
        assert!(pool.drain(Duration::from_secs(1)).await);
    }
}
