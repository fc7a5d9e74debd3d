use std::path::PathBuf;

use thiserror::Error;

/// Credential storage and token provider error types
#[derive(Error, Debug)]
pub enum CkAuthError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error {status}: {body_snippet}")]
    Http {
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Account store at '{path}' is corrupted: {reason}")]
    CorruptedStore { path: PathBuf, reason: String },

    #[error("Account store is locked by another process")]
    LockTimeout,

    #[error("Could not determine a data directory for the account store")]
    NoDataDir,

    #[error("IdC credential is missing {0} - re-authentication required")]
    MissingClientCredentials(&'static str),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Account store unavailable: {0}")]
    Unavailable(String),
}

impl CkAuthError {
    /// Whether the failure is an I/O-class storage failure (as opposed to a provider one)
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::CorruptedStore { .. }
                | Self::LockTimeout
                | Self::NoDataDir
                | Self::Unavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CkAuthError>;
