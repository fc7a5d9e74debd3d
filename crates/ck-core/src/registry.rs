use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use ck_auth::Account;
use tokio::sync::watch;
use tracing::debug;

use crate::sync::SyncAccount;

/// Immutable point-in-time view of every account
///
/// Never mutated in place; the registry swaps in a new snapshot on every write.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    version: u64,
    accounts: BTreeMap<String, Arc<Account>>,
}

impl RegistrySnapshot {
    /// Increases by one on every registry write
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, account_id: &str) -> Option<&Arc<Account>> {
        self.accounts.get(account_id)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Accounts in creation order
    pub fn accounts(&self) -> Vec<Arc<Account>> {
        let mut accounts: Vec<Arc<Account>> = self.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        accounts
    }

    /// Owned copies in creation order, as written to storage
    pub fn to_accounts(&self) -> Vec<Account> {
        self.accounts()
            .into_iter()
            .map(|account| Account::clone(&account))
            .collect()
    }

    /// Export for the downstream sync consumer: only accounts with an access token
    pub fn sync_accounts(&self) -> Vec<SyncAccount> {
        self.accounts()
            .iter()
            .filter_map(|account| SyncAccount::from_account(account))
            .collect()
    }

    pub fn contains_email(&self, email: &str) -> bool {
        self.accounts
            .values()
            .any(|account| account.email.eq_ignore_ascii_case(email))
    }
}

/// Canonical account-id to account map
///
/// Writers are serialized; readers only ever clone the current `Arc` and are
/// never blocked for longer than a pointer swap.
#[derive(Debug)]
pub struct AccountRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
    writer: Mutex<()>,
    persist_tx: watch::Sender<Arc<RegistrySnapshot>>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        let initial = Arc::new(RegistrySnapshot::default());
        let (persist_tx, _) = watch::channel(initial.clone());
        Self {
            current: RwLock::new(initial),
            writer: Mutex::new(()),
            persist_tx,
        }
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, account_id: &str) -> Option<Arc<Account>> {
        self.snapshot().get(account_id).cloned()
    }

    /// Insert or replace an account record as a whole
    pub fn upsert(&self, account: Account) -> Arc<Account> {
        let account = Arc::new(account);
        self.write(true, |accounts| {
            accounts.insert(account.id.clone(), account.clone());
            true
        });
        account
    }

    /// Apply `edit` to a copy of the account and store the copy
    ///
    /// Returns `None` without writing if the account does not exist.
    pub fn update<F>(&self, account_id: &str, edit: F) -> Option<Arc<Account>>
    where
        F: FnOnce(&mut Account),
    {
        let mut updated = None;
        self.write(true, |accounts| {
            if let Some(existing) = accounts.get(account_id) {
                let mut account = Account::clone(existing);
                edit(&mut account);
                let account = Arc::new(account);
                accounts.insert(account_id.to_string(), account.clone());
                updated = Some(account);
            }
            updated.is_some()
        });
        updated
    }

    pub fn remove(&self, account_id: &str) -> Option<Arc<Account>> {
        let mut removed = None;
        self.write(true, |accounts| {
            removed = accounts.remove(account_id);
            removed.is_some()
        });
        removed
    }

    /// Replace the whole registry with freshly loaded accounts
    ///
    /// Does not trigger a persistence write; the accounts came from storage.
    pub fn replace_all(&self, accounts: Vec<Account>) {
        self.write(false, |map| {
            map.clear();
            for account in accounts {
                map.insert(account.id.clone(), Arc::new(account));
            }
            true
        });
    }

    /// Receiver notified with the latest snapshot after every persisted write
    pub fn subscribe_persist(&self) -> watch::Receiver<Arc<RegistrySnapshot>> {
        self.persist_tx.subscribe()
    }

    fn write<F>(&self, persist: bool, mutate: F)
    where
        F: FnOnce(&mut BTreeMap<String, Arc<Account>>) -> bool,
    {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let base = self.snapshot();
        let mut accounts = base.accounts.clone();
        if !mutate(&mut accounts) {
            return;
        }
        let next = Arc::new(RegistrySnapshot {
            version: base.version + 1,
            accounts,
        });

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        debug!(version = next.version, persist, "Registry updated");

        self.persist_tx.send_if_modified(|latest| {
            *latest = next;
            persist
        });
    }
}

impl Default for AccountRegistry {
    fn default() -> Self {
        Self::new()
    }
}
