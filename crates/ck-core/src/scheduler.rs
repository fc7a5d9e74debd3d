use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Message sent when an armed timer elapses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub account_id: String,
    /// Identifies the arming; a fire whose ticket no longer matches is stale
    pub ticket: u64,
}

#[derive(Debug)]
struct ArmedTimer {
    ticket: u64,
    deadline: Instant,
    handle: JoinHandle<()>,
}

/// One cancellable timer per account
///
/// Arming always aborts the previous timer for the same account first, so at
/// most one live timer exists per id.
#[derive(Debug)]
pub struct RefreshScheduler {
    timers: Mutex<HashMap<String, ArmedTimer>>,
    next_ticket: AtomicU64,
    closed: AtomicBool,
    safety_margin: Duration,
    tx: mpsc::UnboundedSender<TimerFired>,
}

impl RefreshScheduler {
    pub fn new(safety_margin: Duration, tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            timers: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            safety_margin,
            tx,
        }
    }

    /// Delay until `expires_at - safety_margin`, zero if that is already past
    pub fn delay_until_refresh(&self, expires_at: DateTime<Utc>) -> Duration {
        let remaining = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        remaining.saturating_sub(self.safety_margin)
    }

    /// Arm the proactive refresh timer for an account
    pub fn arm(&self, account_id: &str, expires_at: DateTime<Utc>) -> Option<Instant> {
        self.arm_after(account_id, self.delay_until_refresh(expires_at))
    }

    /// Arm a timer firing after `delay`, replacing any existing one
    ///
    /// Returns the deadline, or `None` once the scheduler is closed.
    pub fn arm_after(&self, account_id: &str, delay: Duration) -> Option<Instant> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + delay;

        let tx = self.tx.clone();
        let id = account_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            trace!(account_id = %id, ticket, "Refresh timer fired");
            let _ = tx.send(TimerFired {
                account_id: id,
                ticket,
            });
        });

        let mut timers = self.lock();
        if let Some(previous) = timers.insert(
            account_id.to_string(),
            ArmedTimer {
                ticket,
                deadline,
                handle,
            },
        ) {
            previous.handle.abort();
        }
        debug!(account_id, ?delay, "Armed refresh timer");

        Some(deadline)
    }

    /// Claim a fired timer; `false` if it was cancelled or replaced meanwhile
    pub fn take_fired(&self, fired: &TimerFired) -> bool {
        let mut timers = self.lock();
        match timers.get(&fired.account_id) {
            Some(timer) if timer.ticket == fired.ticket => {
                timers.remove(&fired.account_id);
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&self, account_id: &str) -> bool {
        match self.lock().remove(account_id) {
            Some(timer) => {
                timer.handle.abort();
                debug!(account_id, "Cancelled refresh timer");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let mut timers = self.lock();
        let count = timers.len();
        for (_, timer) in timers.drain() {
            timer.handle.abort();
        }
        count
    }

    /// Cancel every timer and refuse further arming
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel_all()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_armed(&self, account_id: &str) -> bool {
        self.lock().contains_key(account_id)
    }

    pub fn deadline(&self, account_id: &str) -> Option<Instant> {
        self.lock().get(account_id).map(|timer| timer.deadline)
    }

    pub fn armed_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ArmedTimer>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
