use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ck_auth::{
    Account, AccountStore, CheckOutcome, CredentialFault, Failure, RefreshOutcome, TokenProvider,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::LifecycleConfig;
use crate::error::LifecycleError;
use crate::events::{EventBroadcaster, LifecycleEvent};
use crate::generation::{GenerationTable, RefreshPhase, TaskKind};
use crate::persist::{Persister, save_snapshot};
use crate::reconcile::{Decision, Reconciler};
use crate::registry::{AccountRegistry, RegistrySnapshot};
use crate::scheduler::{RefreshScheduler, TimerFired};
use crate::worker::{RefreshTask, TaskOutput, TaskResult, Trigger, WorkerPool};

/// Controller lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    Idle,
    Starting,
    Running,
    /// `stop()` in progress: no new work, in-flight results still land
    Closing,
    Stopped,
}

/// What happened to a delivered result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    /// Stale, duplicate, for a removed account, or delivered after shutdown
    Discarded,
}

/// User edit of an account's display fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountEdit {
    pub email: Option<String>,
    /// An empty label clears it
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Ids of the accounts that were added
    pub added: Vec<String>,
    /// Entries skipped because their email or id already existed
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Worker,
    External,
}

struct Channels {
    timers: mpsc::UnboundedReceiver<TimerFired>,
    results: mpsc::UnboundedReceiver<TaskResult>,
}

struct Background {
    engine: JoinHandle<()>,
    stop_engine: CancellationToken,
    persister: Persister,
}

struct Inner {
    config: LifecycleConfig,
    store: Arc<dyn AccountStore>,
    registry: AccountRegistry,
    scheduler: RefreshScheduler,
    pool: WorkerPool,
    reconciler: Reconciler,
    events: EventBroadcaster,
    generations: Mutex<GenerationTable>,
    state: Mutex<ControllerState>,
}

/// Owns the account registry and keeps every account's credentials fresh
///
/// Timers and workers report back over channels to a single engine task that
/// applies results under one lock, so reconciliation is serialized while
/// provider calls and storage writes run without touching the registry.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use ck_auth::{HttpTokenProvider, MemoryAccountStore, ProviderConfig};
/// use ck_core::{LifecycleConfig, LifecycleController};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let controller = LifecycleController::new(
///     LifecycleConfig::default(),
///     Arc::new(MemoryAccountStore::new()),
///     Arc::new(HttpTokenProvider::new(ProviderConfig::default())?),
/// );
/// let mut events = controller.subscribe();
/// controller.start().await?;
///
/// while let Ok(event) = events.recv().await {
///     println!("{}", event.description());
/// }
/// # Ok(())
/// # }
/// ```
pub struct LifecycleController {
    inner: Arc<Inner>,
    channels: Mutex<Option<Channels>>,
    background: Mutex<Option<Background>>,
}

impl LifecycleController {
    pub fn new(
        config: LifecycleConfig,
        store: Arc<dyn AccountStore>,
        provider: Arc<dyn TokenProvider>,
    ) -> Self {
        let (timer_tx, timers) = mpsc::unbounded_channel();
        let (result_tx, results) = mpsc::unbounded_channel();

        let inner = Inner {
            scheduler: RefreshScheduler::new(config.safety_margin, timer_tx),
            pool: WorkerPool::new(provider, config.worker_pool_size, result_tx),
            reconciler: Reconciler::new(config.backoff),
            registry: AccountRegistry::new(),
            events: EventBroadcaster::new(),
            generations: Mutex::new(GenerationTable::new()),
            state: Mutex::new(ControllerState::Idle),
            store,
            config,
        };

        Self {
            inner: Arc::new(inner),
            channels: Mutex::new(Some(Channels { timers, results })),
            background: Mutex::new(None),
        }
    }

    /// Load accounts from storage and arm a timer for every refreshable one
    ///
    /// A storage failure leaves the controller `Idle`, publishes `InitError`
    /// and returns [`LifecycleError::Init`]; `start()` may be retried.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), LifecycleError> {
        {
            let mut state = self.inner.lock_state();
            match *state {
                ControllerState::Idle => *state = ControllerState::Starting,
                ControllerState::Starting | ControllerState::Running => {
                    return Err(LifecycleError::AlreadyRunning);
                }
                ControllerState::Closing | ControllerState::Stopped => {
                    return Err(LifecycleError::Closed);
                }
            }
        }

        info!("Starting credential lifecycle");

        let accounts = match self.inner.store.load().await {
            Ok(accounts) => accounts,
            Err(e) => {
                error!("Failed to load accounts: {}", e);
                self.inner.set_state(ControllerState::Idle);
                self.inner.events.publish(LifecycleEvent::InitError {
                    error: e.to_string(),
                });
                return Err(LifecycleError::Init(e));
            }
        };

        let Some(channels) = lock(&self.channels).take() else {
            self.inner.set_state(ControllerState::Idle);
            return Err(LifecycleError::Closed);
        };

        let loaded = accounts.len();
        self.inner.registry.replace_all(accounts);

        let persister = Persister::spawn(
            self.inner.store.clone(),
            self.inner.registry.subscribe_persist(),
            self.inner.events.clone(),
        );
        let stop_engine = CancellationToken::new();
        let engine = tokio::spawn(run_engine(
            self.inner.clone(),
            channels,
            stop_engine.clone(),
        ));
        *lock(&self.background) = Some(Background {
            engine,
            stop_engine,
            persister,
        });

        let armed = {
            let mut generations = self.inner.lock_generations();
            generations.clear();
            self.inner.set_state(ControllerState::Running);
            self.inner.arm_all(&mut generations)
        };

        info!(loaded, armed, "Credential lifecycle started");
        Ok(())
    }

    /// Cancel every timer, wait for in-flight tasks, flush state to storage
    ///
    /// Results finishing within the grace period are reconciled without
    /// re-arming. Calling `stop()` again is a no-op. Returns
    /// [`LifecycleError::Storage`] if the final flush failed; the controller is
    /// stopped either way.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        {
            let mut state = self.inner.lock_state();
            match *state {
                ControllerState::Running => *state = ControllerState::Closing,
                ControllerState::Idle => {
                    *state = ControllerState::Stopped;
                    self.inner.scheduler.close();
                    return Ok(());
                }
                ControllerState::Starting => return Err(LifecycleError::NotRunning),
                ControllerState::Closing | ControllerState::Stopped => return Ok(()),
            }
        }

        info!("Stopping credential lifecycle");

        let cancelled = self.inner.scheduler.close();
        let drained = self.inner.pool.drain(self.inner.config.shutdown_grace).await;

        let background = lock(&self.background).take();
        if let Some(background) = background {
            background.stop_engine.cancel();
            if let Err(e) = background.engine.await {
                warn!("Engine task ended abnormally: {}", e);
            }
            background.persister.shutdown().await;
        }

        self.inner.lock_generations().clear();

        let snapshot = self.inner.registry.snapshot();
        let flushed = save_snapshot(self.inner.store.as_ref(), &snapshot, &self.inner.events).await;

        self.inner.set_state(ControllerState::Stopped);
        info!(
            cancelled_timers = cancelled,
            drained,
            accounts = snapshot.len(),
            "Credential lifecycle stopped"
        );

        flushed.map_err(LifecycleError::Storage)
    }

    /// Reload storage into the registry, invalidating everything in flight
    ///
    /// A failed load leaves the current registry untouched.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> Result<usize, LifecycleError> {
        self.inner.ensure_running()?;

        let accounts = self
            .inner
            .store
            .load()
            .await
            .map_err(LifecycleError::Storage)?;
        let loaded = accounts.len();

        let mut generations = self.inner.lock_generations();
        self.inner.ensure_running()?;

        self.inner.scheduler.cancel_all();
        generations.clear();
        self.inner.registry.replace_all(accounts);
        let armed = self.inner.arm_all(&mut generations);

        info!(loaded, armed, "Reloaded accounts");
        Ok(loaded)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.inner.registry.snapshot()
    }

    pub fn state(&self) -> ControllerState {
        self.inner.state()
    }

    /// Runtime refresh phase, `None` for unknown accounts
    pub fn phase(&self, account_id: &str) -> Option<RefreshPhase> {
        let generations = self.inner.lock_generations();
        self.inner.registry.get(account_id)?;
        Some(generations.phase(account_id))
    }

    /// Time until the account's armed timer fires
    pub fn next_refresh_in(&self, account_id: &str) -> Option<Duration> {
        self.inner
            .scheduler
            .deadline(account_id)
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn armed_timers(&self) -> usize {
        self.inner.scheduler.armed_count()
    }

    /// Refresh now, superseding any scheduled or in-flight refresh
    ///
    /// Returns the generation the result will be reconciled under.
    #[instrument(skip(self))]
    pub fn manual_refresh(&self, account_id: &str) -> Result<u64, LifecycleError> {
        let mut generations = self.inner.lock_generations();
        self.inner.ensure_running()?;

        let generation =
            self.inner
                .dispatch(&mut generations, account_id, TaskKind::Refresh, Trigger::Manual)?;
        info!(generation, "Manual refresh submitted");
        Ok(generation)
    }

    /// Validate the account's credential and refresh its subscription metadata
    ///
    /// A valid check clears any fault, which is how a suspended or failing
    /// account is re-validated.
    #[instrument(skip(self))]
    pub fn check_account(&self, account_id: &str) -> Result<u64, LifecycleError> {
        let mut generations = self.inner.lock_generations();
        self.inner.ensure_running()?;

        let generation =
            self.inner
                .dispatch(&mut generations, account_id, TaskKind::Check, Trigger::Manual)?;
        info!(generation, "Validation check submitted");
        Ok(generation)
    }

    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub fn add_account(&self, account: Account) -> Result<Arc<Account>, LifecycleError> {
        let mut generations = self.inner.lock_generations();
        self.inner.ensure_running()?;

        if self.inner.registry.get(&account.id).is_some() {
            return Err(LifecycleError::DuplicateAccount(account.id));
        }

        let account = self.inner.add(&mut generations, account);
        info!(email = %account.email, "Account added");
        Ok(account)
    }

    /// Add several accounts, skipping any whose email or id is already present
    #[instrument(skip(self, accounts), fields(count = accounts.len()))]
    pub fn import_accounts(&self, accounts: Vec<Account>) -> Result<ImportSummary, LifecycleError> {
        let mut generations = self.inner.lock_generations();
        self.inner.ensure_running()?;

        let mut summary = ImportSummary::default();
        for account in accounts {
            let snapshot = self.inner.registry.snapshot();
            if snapshot.get(&account.id).is_some() || snapshot.contains_email(&account.email) {
                debug!(email = %account.email, "Skipping duplicate account");
                summary.skipped += 1;
                continue;
            }

            let account = self.inner.add(&mut generations, account);
            summary.added.push(account.id.clone());
        }

        info!(
            added = summary.added.len(),
            skipped = summary.skipped,
            "Imported accounts"
        );
        Ok(summary)
    }

    #[instrument(skip(self, edit))]
    pub fn edit_account(
        &self,
        account_id: &str,
        edit: AccountEdit,
    ) -> Result<Arc<Account>, LifecycleError> {
        self.inner.ensure_running()?;

        let updated = self
            .inner
            .registry
            .update(account_id, |account| {
                if let Some(email) = edit.email {
                    account.email = email;
                }
                if let Some(label) = edit.label {
                    account.label = Some(label).filter(|l| !l.trim().is_empty());
                }
            })
            .ok_or_else(|| LifecycleError::UnknownAccount(account_id.to_string()))?;

        self.inner.events.publish(LifecycleEvent::AccountUpdated {
            account_id: account_id.to_string(),
        });
        Ok(updated)
    }

    /// Remove an account, cancelling its timer and dropping any in-flight result
    #[instrument(skip(self))]
    pub fn remove_account(&self, account_id: &str) -> Result<Arc<Account>, LifecycleError> {
        let mut generations = self.inner.lock_generations();
        self.inner.ensure_running()?;

        self.inner.scheduler.cancel(account_id);
        generations.forget(account_id);

        let removed = self
            .inner
            .registry
            .remove(account_id)
            .ok_or_else(|| LifecycleError::UnknownAccount(account_id.to_string()))?;

        info!(email = %removed.email, "Account removed");
        self.inner.events.publish(LifecycleEvent::AccountRemoved {
            account_id: account_id.to_string(),
        });
        Ok(removed)
    }

    /// Feed a refresh result produced outside this process
    ///
    /// Safe to call at any time; anything not matching the account's pending
    /// generation, or arriving once shutdown has begun, is discarded.
    pub fn handle_background_refresh_result(
        &self,
        account_id: &str,
        generation: u64,
        outcome: RefreshOutcome,
    ) -> Disposition {
        self.inner.reconcile(
            TaskResult {
                account_id: account_id.to_string(),
                generation,
                output: TaskOutput::Refresh(outcome),
            },
            Origin::External,
        )
    }

    /// Feed a validation check result produced outside this process
    pub fn handle_background_check_result(
        &self,
        account_id: &str,
        generation: u64,
        outcome: CheckOutcome,
    ) -> Disposition {
        self.inner.reconcile(
            TaskResult {
                account_id: account_id.to_string(),
                generation,
                output: TaskOutput::Check(outcome),
            },
            Origin::External,
        )
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        if let Some(background) = lock(&self.background).take() {
            background.stop_engine.cancel();
        }
        self.inner.scheduler.close();
        self.inner.pool.abort();
    }
}

async fn run_engine(inner: Arc<Inner>, mut channels: Channels, stop: CancellationToken) {
    debug!("Reconciliation engine started");

    loop {
        tokio::select! {
            biased;
            Some(result) = channels.results.recv() => {
                inner.reconcile(result, Origin::Worker);
            }
            Some(fired) = channels.timers.recv() => inner.on_timer(fired),
            _ = stop.cancelled() => break,
        }
    }

    // Workers have finished by now; apply whatever they left in the queue
    while let Ok(result) = channels.results.try_recv() {
        inner.reconcile(result, Origin::Worker);
    }

    debug!("Reconciliation engine stopped");
}

impl Inner {
    fn state(&self) -> ControllerState {
        *self.lock_state()
    }

    fn set_state(&self, state: ControllerState) {
        *self.lock_state() = state;
    }

    fn ensure_running(&self) -> Result<(), LifecycleError> {
        match self.state() {
            ControllerState::Running => Ok(()),
            ControllerState::Idle | ControllerState::Starting => Err(LifecycleError::NotRunning),
            ControllerState::Closing | ControllerState::Stopped => Err(LifecycleError::Closed),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        lock(&self.state)
    }

    fn lock_generations(&self) -> MutexGuard<'_, GenerationTable> {
        lock(&self.generations)
    }

    fn add(&self, generations: &mut GenerationTable, account: Account) -> Arc<Account> {
        generations.forget(&account.id);
        let account = self.registry.upsert(account);
        self.arm_account(generations, &account);
        self.events.publish(LifecycleEvent::AccountUpdated {
            account_id: account.id.clone(),
        });
        account
    }

    fn arm_all(&self, generations: &mut GenerationTable) -> usize {
        self.registry
            .snapshot()
            .accounts()
            .iter()
            .filter(|account| self.arm_account(generations, account))
            .count()
    }

    /// Arm the account's timer if it can refresh; returns whether it was armed
    fn arm_account(&self, generations: &mut GenerationTable, account: &Account) -> bool {
        let phase = match &account.credentials {
            _ if account.is_terminal() => RefreshPhase::Halted,
            Some(credential) if account.is_schedulable() => {
                self.arm_at(&account.id, credential.expires_at)
            }
            _ => RefreshPhase::Idle,
        };
        generations.set_phase(&account.id, phase);
        phase == RefreshPhase::Scheduled
    }

    fn arm_at(&self, account_id: &str, expires_at: DateTime<Utc>) -> RefreshPhase {
        match self.scheduler.arm(account_id, expires_at) {
            Some(_) => RefreshPhase::Scheduled,
            None => RefreshPhase::Idle,
        }
    }

    fn dispatch(
        &self,
        generations: &mut GenerationTable,
        account_id: &str,
        kind: TaskKind,
        trigger: Trigger,
    ) -> Result<u64, LifecycleError> {
        let account = self
            .registry
            .get(account_id)
            .ok_or_else(|| LifecycleError::UnknownAccount(account_id.to_string()))?;

        let credential = match (&account.credentials, kind) {
            (Some(credential), TaskKind::Check) => credential.clone(),
            (Some(credential), TaskKind::Refresh) if !credential.refresh_token.is_empty() => {
                credential.clone()
            }
            _ => return Err(LifecycleError::MissingCredentials(account_id.to_string())),
        };

        let generation = match kind {
            TaskKind::Refresh => {
                self.scheduler.cancel(account_id);
                if trigger == Trigger::Manual {
                    // A user-initiated retry starts a fresh backoff budget
                    generations.set_failures(account_id, 0);
                }
                generations.begin_refresh(account_id)
            }
            TaskKind::Check => generations.begin_check(account_id),
        };

        let submitted = self.pool.submit(RefreshTask {
            account_id: account_id.to_string(),
            generation,
            requested_at: Utc::now(),
            kind,
            trigger,
            credential,
        });

        if !submitted {
            generations.invalidate(account_id);
            return Err(LifecycleError::Closed);
        }

        debug!(account_id, generation, ?kind, ?trigger, "Task submitted");
        Ok(generation)
    }

    fn on_timer(&self, fired: TimerFired) {
        let mut generations = self.lock_generations();

        if !self.scheduler.take_fired(&fired) {
            trace!(account_id = %fired.account_id, "Ignoring superseded timer");
            return;
        }
        if self.state() != ControllerState::Running {
            return;
        }

        let trigger = match generations.phase(&fired.account_id) {
            RefreshPhase::RetryScheduled { .. } => Trigger::Retry,
            _ => Trigger::Scheduled,
        };

        if let Err(e) = self.dispatch(&mut generations, &fired.account_id, TaskKind::Refresh, trigger)
        {
            debug!(account_id = %fired.account_id, "Timer fired but refresh not submitted: {}", e);
        }
    }

    fn reconcile(&self, result: TaskResult, origin: Origin) -> Disposition {
        let mut generations = self.lock_generations();

        let state = self.state();
        let accepts = match origin {
            Origin::External => state == ControllerState::Running,
            Origin::Worker => matches!(state, ControllerState::Running | ControllerState::Closing),
        };
        if !accepts {
            debug!(
                account_id = %result.account_id,
                generation = result.generation,
                ?state,
                "Discarding result delivered outside the running session"
            );
            return Disposition::Discarded;
        }

        let kind = result.output.kind();
        if !generations.accept(&result.account_id, kind, result.generation) {
            debug!(
                account_id = %result.account_id,
                generation = result.generation,
                ?kind,
                "Discarding stale result"
            );
            return Disposition::Discarded;
        }

        let Some(account) = self.registry.get(&result.account_id) else {
            generations.forget(&result.account_id);
            return Disposition::Discarded;
        };

        let decision = match result.output {
            TaskOutput::Refresh(outcome) => {
                let Some(current) = account.credentials.as_ref() else {
                    return Disposition::Discarded;
                };
                let failures = generations.failures(&account.id);
                self.reconciler.refresh(current, outcome, failures)
            }
            TaskOutput::Check(outcome) => self.reconciler.check(outcome),
        };

        let rearm = state == ControllerState::Running;
        self.apply(&mut generations, &account, decision, rearm);
        Disposition::Applied
    }

    fn apply(
        &self,
        generations: &mut GenerationTable,
        account: &Account,
        decision: Decision,
        rearm: bool,
    ) {
        let id = account.id.as_str();

        match decision {
            Decision::Refreshed(credential) => {
                let expires_at = credential.expires_at;
                self.registry.update(id, |account| {
                    account.credentials = Some(credential);
                    account.fault = None;
                });
                generations.set_failures(id, 0);

                let phase = if rearm {
                    self.arm_at(id, expires_at)
                } else {
                    RefreshPhase::Idle
                };
                generations.set_phase(id, phase);

                info!(account_id = id, email = %account.email, %expires_at, "Credential refreshed");
                self.events.publish(LifecycleEvent::AccountUpdated {
                    account_id: id.to_string(),
                });
            }
            Decision::NeedsReauth { reason } => {
                self.halt(generations, id);
                self.registry.update(id, |account| {
                    account.fault = Some(CredentialFault::NeedsReauth {
                        reason: reason.clone(),
                        at: Utc::now(),
                    });
                });

                warn!(account_id = id, email = %account.email, %reason, "Refresh token rejected, re-authentication required");
                self.events.publish(LifecycleEvent::AccountNeedsReauth {
                    account_id: id.to_string(),
                    reason,
                });
            }
            Decision::Suspended { detail } => {
                self.halt(generations, id);
                self.registry.update(id, |account| {
                    account.fault = Some(CredentialFault::Suspended {
                        detail: detail.clone(),
                        at: Utc::now(),
                    });
                });

                warn!(account_id = id, email = %account.email, %detail, "Account suspended by provider");
                self.events.publish(LifecycleEvent::AccountSuspended {
                    account_id: id.to_string(),
                    detail,
                });
            }
            Decision::Retry {
                attempt,
                delay,
                failure,
            } => {
                generations.set_failures(id, attempt);
                match &failure {
                    Failure::Unknown(detail) => {
                        warn!(account_id = id, attempt, ?delay, %detail, "Unclassified refresh failure, retrying")
                    }
                    _ => {
                        warn!(account_id = id, attempt, ?delay, detail = %failure.detail(), "Transient refresh failure, retrying")
                    }
                }

                let phase = if rearm && self.scheduler.arm_after(id, delay).is_some() {
                    RefreshPhase::RetryScheduled { attempt }
                } else {
                    RefreshPhase::Idle
                };
                generations.set_phase(id, phase);

                self.events.publish(LifecycleEvent::RetryScheduled {
                    account_id: id.to_string(),
                    attempt,
                    delay,
                });
            }
            Decision::Escalate { failures, failure } => {
                self.halt(generations, id);
                generations.set_failures(id, failures);
                let detail = failure.detail().to_string();
                self.registry.update(id, |account| {
                    account.fault = Some(CredentialFault::Failing {
                        detail: detail.clone(),
                        failures,
                        at: Utc::now(),
                    });
                });

                error!(account_id = id, email = %account.email, failures, kind = failure.kind(), %detail, "Refresh keeps failing, background refresh stopped");
                self.events.publish(LifecycleEvent::AccountFailing {
                    account_id: id.to_string(),
                    detail,
                    failures,
                });
            }
            Decision::Validated { subscription } => {
                let updated = self.registry.update(id, |account| {
                    account.fault = None;
                    if subscription.is_some() {
                        account.subscription = subscription;
                    }
                });
                generations.set_failures(id, 0);

                if let Some(updated) = updated
                    && rearm
                    && !generations.is_refreshing(id)
                {
                    self.arm_account(generations, &updated);
                }

                info!(account_id = id, email = %account.email, "Account validated");
                self.events.publish(LifecycleEvent::AccountUpdated {
                    account_id: id.to_string(),
                });
            }
            Decision::Inconclusive { failure } => {
                warn!(account_id = id, kind = failure.kind(), detail = %failure.detail(), "Validation check inconclusive");
            }
        }
    }

    fn halt(&self, generations: &mut GenerationTable, account_id: &str) {
        self.scheduler.cancel(account_id);
        generations.set_phase(account_id, RefreshPhase::Halted);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
