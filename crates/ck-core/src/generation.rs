use std::collections::HashMap;

/// Runtime refresh phase of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshPhase {
    /// No timer and nothing in flight
    Idle,
    /// Timer armed for the next proactive refresh
    Scheduled,
    /// A refresh task is in flight
    Refreshing,
    /// Waiting out a backoff after `attempt` consecutive failures
    RetryScheduled { attempt: u32 },
    /// Stopped until the user acts (re-auth, suspension, retry budget exhausted)
    Halted,
}

/// Kind of task a generation was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Refresh,
    Check,
}

#[derive(Debug)]
struct Slot {
    pending_refresh: Option<u64>,
    pending_check: Option<u64>,
    failures: u32,
    phase: RefreshPhase,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            pending_refresh: None,
            pending_check: None,
            failures: 0,
            phase: RefreshPhase::Idle,
        }
    }
}

/// Per-account generation bookkeeping
///
/// Generations come from one counter shared by every account, so a number is
/// never handed out twice, not even after an account is removed and re-added.
/// A result is accepted only while its generation is the one pending for its
/// account; accepting clears the slot, which makes duplicate delivery a no-op.
#[derive(Debug, Default)]
pub struct GenerationTable {
    counter: u64,
    slots: HashMap<String, Slot>,
}

impl GenerationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new refresh generation, superseding any pending one
    pub fn begin_refresh(&mut self, account_id: &str) -> u64 {
        let generation = self.next();
        let slot = self.slot_mut(account_id);
        slot.pending_refresh = Some(generation);
        slot.phase = RefreshPhase::Refreshing;
        generation
    }

    /// Issue a new check generation; checks do not supersede refreshes
    pub fn begin_check(&mut self, account_id: &str) -> u64 {
        let generation = self.next();
        self.slot_mut(account_id).pending_check = Some(generation);
        generation
    }

    /// Consume the pending generation if `generation` matches it
    pub fn accept(&mut self, account_id: &str, kind: TaskKind, generation: u64) -> bool {
        let Some(slot) = self.slots.get_mut(account_id) else {
            return false;
        };

        let pending = match kind {
            TaskKind::Refresh => &mut slot.pending_refresh,
            TaskKind::Check => &mut slot.pending_check,
        };

        if *pending == Some(generation) {
            *pending = None;
            true
        } else {
            false
        }
    }

    /// Drop any pending generation without forgetting the failure count
    pub fn invalidate(&mut self, account_id: &str) {
        if let Some(slot) = self.slots.get_mut(account_id) {
            slot.pending_refresh = None;
            slot.pending_check = None;
            if slot.phase == RefreshPhase::Refreshing {
                slot.phase = RefreshPhase::Idle;
            }
        }
    }

    /// Forget the account entirely
    pub fn forget(&mut self, account_id: &str) {
        self.slots.remove(account_id);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn is_refreshing(&self, account_id: &str) -> bool {
        self.slots
            .get(account_id)
            .is_some_and(|slot| slot.pending_refresh.is_some())
    }

    pub fn failures(&self, account_id: &str) -> u32 {
        self.slots.get(account_id).map_or(0, |slot| slot.failures)
    }

    pub fn set_failures(&mut self, account_id: &str, failures: u32) {
        self.slot_mut(account_id).failures = failures;
    }

    pub fn phase(&self, account_id: &str) -> RefreshPhase {
        self.slots
            .get(account_id)
            .map_or(RefreshPhase::Idle, |slot| slot.phase)
    }

    pub fn set_phase(&mut self, account_id: &str, phase: RefreshPhase) {
        self.slot_mut(account_id).phase = phase;
    }

    fn next(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn slot_mut(&mut self, account_id: &str) -> &mut Slot {
        self.slots.entry(account_id.to_string()).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_generation_supersedes() {
        let mut table = GenerationTable::new();
        let scheduled = table.begin_refresh("a");
        let manual = table.begin_refresh("a");

        assert!(manual > scheduled);
        assert!(!table.accept("a", TaskKind::Refresh, scheduled));
        assert!(table.accept("a", TaskKind::Refresh, manual));
    }

    #[test]
    fn test_duplicate_delivery_is_rejected() {
        let mut table = GenerationTable::new();
        let generation = table.begin_refresh("a");

        assert!(table.accept("a", TaskKind::Refresh, generation));
        assert!(!table.accept("a", TaskKind::Refresh, generation));
    }

    #[test]
    fn test_forget_rejects_in_flight_results() {
        let mut table = GenerationTable::new();
        let generation = table.begin_refresh("a");
        table.forget("a");

        assert!(!table.accept("a", TaskKind::Refresh, generation));

        // Re-adding the same id never reuses a generation
        let again = table.begin_refresh("a");
        assert!(again > generation);
    }

    #[test]
    fn test_check_and_refresh_are_tracked_separately() {
        let mut table = GenerationTable::new();
        let refresh = table.begin_refresh("a");
        let check = table.begin_check("a");

        assert!(!table.accept("a", TaskKind::Refresh, check));
        assert!(table.accept("a", TaskKind::Check, check));
        assert!(table.accept("a", TaskKind::Refresh, refresh));
    }

    #[test]
    fn test_invalidate_keeps_failure_count() {
        let mut table = GenerationTable::new();
        let generation = table.begin_refresh("a");
        table.set_failures("a", 2);
        table.invalidate("a");

        assert!(!table.accept("a", TaskKind::Refresh, generation));
        assert_eq!(table.failures("a"), 2);
        assert_eq!(table.phase("a"), RefreshPhase::Idle);
    }
}
