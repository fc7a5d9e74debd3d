use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_SAFETY_MARGIN;

/// A managed identity with its own credential set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Stable identifier, assigned at creation
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<CredentialFault>,
    #[serde(default = "Utc::now", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with a freshly generated id
    pub fn new(email: impl Into<String>, credentials: Option<Credential>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.into(),
            label: None,
            credentials,
            subscription: None,
            fault: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the account holds a credential that can be presented to the provider
    pub fn has_usable_credentials(&self) -> bool {
        self.credentials
            .as_ref()
            .is_some_and(|c| !c.refresh_token.is_empty())
    }

    /// Whether the account sits in a state that no amount of retrying will fix
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.fault,
            Some(CredentialFault::NeedsReauth { .. }) | Some(CredentialFault::Suspended { .. })
        )
    }

    /// Whether the background scheduler should keep a timer armed for this account
    pub fn is_schedulable(&self) -> bool {
        self.has_usable_credentials() && !self.is_terminal()
    }

    /// Derived display status using the default safety margin
    pub fn status(&self) -> AccountStatus {
        self.status_at(Utc::now(), Self::default_margin())
    }

    /// Derived display status at `now`, treating tokens within `margin` of expiry as expiring
    pub fn status_at(&self, now: DateTime<Utc>, margin: Duration) -> AccountStatus {
        match &self.fault {
            Some(CredentialFault::Suspended { .. }) => return AccountStatus::Suspended,
            Some(CredentialFault::NeedsReauth { .. }) => return AccountStatus::Expired,
            Some(CredentialFault::Failing { .. }) => return AccountStatus::Error,
            None => {}
        }

        let Some(credentials) = &self.credentials else {
            return AccountStatus::Error;
        };

        if credentials.is_expired_at(now) {
            AccountStatus::Expired
        } else if credentials.expires_at - now < margin {
            AccountStatus::Expiring
        } else {
            AccountStatus::Active
        }
    }

    fn default_margin() -> Duration {
        Duration::from_std(DEFAULT_SAFETY_MARGIN).unwrap_or(Duration::seconds(300))
    }
}

/// Token/secret bundle used to authenticate to the provider on behalf of an account
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub auth_method: AuthMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_arn: Option<String>,
    /// Absolute expiry, persisted as epoch milliseconds
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("region", &self.region)
            .field("provider", &self.provider)
            .field("auth_method", &self.auth_method)
            .field("profile_arn", &self.profile_arn)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Provider authentication method; picks the refresh strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AuthMethod {
    #[serde(rename = "idc", alias = "IdC", alias = "IDC", alias = "Idc")]
    Idc,
    #[serde(rename = "social", alias = "Social", alias = "SOCIAL")]
    Social,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idc => "idc",
            Self::Social => "social",
        }
    }
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cached plan metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscription {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub plan_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Subscription {
    /// Whether the account looks like it has never held a paid plan
    ///
    /// Heuristic: no plan type at all, or a plan type containing `FREE`.
    pub fn is_first_time(&self) -> bool {
        match self.plan_type.as_deref() {
            None => true,
            Some(plan) => {
                let plan = plan.trim().to_uppercase();
                plan.is_empty() || plan.contains("FREE")
            }
        }
    }

    /// Best label for display: title, then type, then `Free`
    pub fn display_name(&self) -> &str {
        self.title
            .as_deref()
            .or(self.plan_type.as_deref())
            .unwrap_or("Free")
    }
}

/// Persisted record of why an account stopped refreshing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CredentialFault {
    /// Refresh token rejected; the user must sign in again
    NeedsReauth {
        reason: String,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        at: DateTime<Utc>,
    },
    /// Account banned by the provider; `detail` is the raw provider error
    Suspended {
        detail: String,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        at: DateTime<Utc>,
    },
    /// Retry budget exhausted on transient failures
    Failing {
        detail: String,
        failures: u32,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        at: DateTime<Utc>,
    },
}

impl CredentialFault {
    pub fn detail(&self) -> &str {
        match self {
            Self::NeedsReauth { reason, .. } => reason,
            Self::Suspended { detail, .. } | Self::Failing { detail, .. } => detail,
        }
    }
}

/// Derived account status, never stored
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Expiring,
    Expired,
    Suspended,
    Error,
}
