//! Account model, token provider and account storage for credkeeper
//!
//! This crate holds everything the credential lifecycle needs to talk to the
//! outside world:
//!
//! - [`Account`] / [`Credential`]: the persisted identity and token bundle
//! - [`TokenProvider`]: refresh and validation contract, with every failure
//!   classified into a [`Failure`] instead of an error
//! - [`HttpTokenProvider`]: HTTP implementation branching on [`AuthMethod`]
//! - [`AccountStore`]: persistence contract, with in-memory and file backends
//!
//! # Example
//!
//! ```no_run
//! use ck_auth::{AccountStore, FileAccountStore, HttpTokenProvider, ProviderConfig, TokenProvider};
//!
//! # async fn example() -> ck_auth::Result<()> {
//! let store = FileAccountStore::new(FileAccountStore::default_storage_dir()?).await?;
//! let provider = HttpTokenProvider::new(ProviderConfig::default())?;
//!
//! for account in store.load().await? {
//!     if let Some(credential) = &account.credentials {
//!         let outcome = provider.refresh(credential).await;
//!         println!("{}: {:?}", account.email, outcome);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Important Notes
//!
//! - Tokens should be stored securely and never logged; `Credential`'s `Debug`
//!   output redacts them
//! - `expiresAt` is the single source of truth for scheduling and is stored as
//!   epoch milliseconds

pub mod account;
pub mod client;
pub mod config;
pub mod errors;
pub mod file_store;
pub mod models;
pub mod provider;
pub mod store;

// Re-export main types
pub use account::{Account, AccountStatus, AuthMethod, Credential, CredentialFault, Subscription};
pub use client::HttpTokenProvider;
pub use config::{DEFAULT_SAFETY_MARGIN, Endpoints, HttpTimeouts, ProviderConfig};
pub use errors::{CkAuthError, Result};
pub use file_store::FileAccountStore;
pub use provider::{CheckOutcome, CheckReport, Failure, RefreshOutcome, TokenProvider};
pub use store::{AccountStore, MemoryAccountStore};
