//! Credential lifecycle engine
//!
//! Keeps a pool of accounts' credentials fresh in the background:
//!
//! - [`AccountRegistry`]: canonical account map exposing immutable snapshots
//! - [`RefreshScheduler`]: one cancellable timer per account, firing a safety
//!   margin before `expiresAt`
//! - [`WorkerPool`]: bounded concurrent provider calls
//! - [`Reconciler`]: maps provider outcomes to registry decisions
//! - [`LifecycleController`]: start/stop/reload and the operations the UI calls
//!
//! Every result is tagged with a generation; only the latest generation issued
//! for an account is ever applied, so stale and duplicate deliveries are dropped.

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod generation;
pub mod persist;
pub mod reconcile;
pub mod registry;
pub mod scheduler;
pub mod sync;
pub mod worker;

pub use config::{BackoffPolicy, LifecycleConfig};
pub use controller::{
    AccountEdit, ControllerState, Disposition, ImportSummary, LifecycleController,
};
pub use error::LifecycleError;
pub use events::{EventBroadcaster, LifecycleEvent};
pub use generation::{GenerationTable, RefreshPhase, TaskKind};
pub use reconcile::{Decision, Reconciler};
pub use registry::{AccountRegistry, RegistrySnapshot};
pub use scheduler::RefreshScheduler;
pub use sync::SyncAccount;
pub use worker::{RefreshTask, TaskOutput, TaskResult, Trigger, WorkerPool};
