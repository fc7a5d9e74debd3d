//! Lifecycle events.
//!
//! Everything the UI layer needs to react to is published here; state itself is
//! read from the registry snapshot.

use std::time::Duration;

use tokio::sync::broadcast;

/// Events broadcast as the controller reconciles results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Credentials or metadata changed; re-read the snapshot
    AccountUpdated { account_id: String },
    /// The refresh token was rejected; the user has to sign in again
    AccountNeedsReauth { account_id: String, reason: String },
    /// The provider suspended the account; `detail` is the raw provider error
    AccountSuspended { account_id: String, detail: String },
    /// Retry budget exhausted, background refresh stopped
    AccountFailing {
        account_id: String,
        detail: String,
        failures: u32,
    },
    /// A transient failure was scheduled for retry
    RetryScheduled {
        account_id: String,
        attempt: u32,
        delay: Duration,
    },
    AccountRemoved { account_id: String },
    /// A background save failed; in-memory state is kept
    PersistFailed { error: String },
    /// Startup could not load accounts
    InitError { error: String },
}

impl LifecycleEvent {
    /// Get a description of the event for logging.
    pub fn description(&self) -> String {
        match self {
            Self::AccountUpdated { account_id } => format!("Account updated: {}", account_id),
            Self::AccountNeedsReauth { account_id, .. } => {
                format!("Account needs re-authentication: {}", account_id)
            }
            Self::AccountSuspended { account_id, .. } => {
                format!("Account suspended: {}", account_id)
            }
            Self::AccountFailing {
                account_id,
                failures,
                ..
            } => format!("Account failing after {} attempts: {}", failures, account_id),
            Self::RetryScheduled {
                account_id,
                attempt,
                delay,
            } => format!(
                "Retry {} scheduled in {:?}: {}",
                attempt, delay, account_id
            ),
            Self::AccountRemoved { account_id } => format!("Account removed: {}", account_id),
            Self::PersistFailed { .. } => "Persisting accounts failed".to_string(),
            Self::InitError { .. } => "Initialization failed".to_string(),
        }
    }
}

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Fan-out of lifecycle events to any number of subscribers
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Publish an event, returning how many subscribers received it
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        tracing::debug!("Publishing lifecycle event: {}", event.description());
        // No subscribers is fine
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
