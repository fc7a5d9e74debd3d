use std::sync::{Arc, RwLock};

use crate::account::Account;
use crate::errors::{CkAuthError, Result};

/// Persistence medium for the account pool
///
/// Implementations must round-trip every credential field, `expiresAt` included.
#[async_trait::async_trait]
pub trait AccountStore: Send + Sync {
    /// Load every persisted account
    async fn load(&self) -> Result<Vec<Account>>;

    /// Replace the persisted account set
    async fn save(&self, accounts: &[Account]) -> Result<()>;
}

/// In-memory account store for testing and embedding
#[derive(Debug, Clone, Default)]
pub struct MemoryAccountStore {
    accounts: Arc<RwLock<Vec<Account>>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with accounts
    pub fn with_accounts(accounts: Vec<Account>) -> Self {
        Self {
            accounts: Arc::new(RwLock::new(accounts)),
        }
    }

    /// Current contents without going through the async trait
    pub fn accounts(&self) -> Vec<Account> {
        self.accounts
            .read()
            .map(|a| a.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl AccountStore for MemoryAccountStore {
    async fn load(&self) -> Result<Vec<Account>> {
        self.accounts
            .read()
            .map(|a| a.clone())
            .map_err(|_| CkAuthError::Unavailable("Lock poisoned".to_string()))
    }

    async fn save(&self, accounts: &[Account]) -> Result<()> {
        *self
            .accounts
            .write()
            .map_err(|_| CkAuthError::Unavailable("Lock poisoned".to_string()))? = accounts.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_replaces_contents() {
        let store = MemoryAccountStore::with_accounts(vec![Account::new("old@example.com", None)]);
        assert_eq!(store.load().await.unwrap().len(), 1);

        let fresh = vec![
            Account::new("a@example.com", None),
            Account::new("b@example.com", None),
        ];
        store.save(&fresh).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, fresh);
    }

    #[test]
    fn test_load_outside_runtime() {
        let store = MemoryAccountStore::with_accounts(vec![Account::new("a@example.com", None)]);
        let loaded = tokio_test::block_on(store.load()).unwrap();
        assert_eq!(loaded, store.accounts());
    }
}
