use ck_auth::CkAuthError;
use thiserror::Error;

/// Errors returned by the lifecycle controller's public operations
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Storage could not be loaded at startup; the session cannot continue
    #[error("Failed to initialize account registry: {0}")]
    Init(#[source] CkAuthError),

    /// Storage failed outside startup
    #[error("Storage error: {0}")]
    Storage(#[source] CkAuthError),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Account already exists: {0}")]
    DuplicateAccount(String),

    /// The account has no refresh token to present to the provider
    #[error("Account {0} has no usable credentials")]
    MissingCredentials(String),

    #[error("Controller is not running")]
    NotRunning,

    #[error("Controller is already running")]
    AlreadyRunning,

    /// Shutdown has begun or completed
    #[error("Controller is closed")]
    Closed,
}

impl LifecycleError {
    /// Whether this error means the session failed to come up
    pub fn is_init(&self) -> bool {
        matches!(self, Self::Init(_))
    }
}
