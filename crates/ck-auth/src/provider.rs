use reqwest::StatusCode;

use crate::account::{Credential, Subscription};

/// Classified provider failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Refresh token itself invalid; requires re-authentication, not retryable
    Expired(String),
    /// Account banned by the provider; carries the raw error detail verbatim
    Suspended(String),
    /// Network or server-side failure; retryable
    Transient(String),
    /// Unclassified; retried like `Transient` but reported distinctly
    Unknown(String),
}

impl Failure {
    pub fn detail(&self) -> &str {
        match self {
            Self::Expired(d) | Self::Suspended(d) | Self::Transient(d) | Self::Unknown(d) => d,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Unknown(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Expired(_) => "expired",
            Self::Suspended(_) => "suspended",
            Self::Transient(_) => "transient",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Result of a refresh exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed(Credential),
    Failed(Failure),
}

/// Data returned by a successful validation check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub subscription: Option<Subscription>,
}

/// Result of a validation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Valid(CheckReport),
    Failed(Failure),
}

/// Performs the network exchange that refreshes or validates a credential
///
/// Implementations never return errors; every failure is classified.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    /// Exchange the credential's refresh token for a new credential
    async fn refresh(&self, credential: &Credential) -> RefreshOutcome;

    /// Validate the credential and fetch account metadata
    async fn check(&self, credential: &Credential) -> CheckOutcome;
}

const SUSPENSION_MARKERS: &[&str] = &["suspend", "banned", "disabled", "locked"];
const EXPIRY_MARKERS: &[&str] = &["invalid_grant", "invalidgrant", "expired", "unauthorized"];

/// Classify a non-success HTTP response
pub fn classify_http(status: StatusCode, body: &str) -> Failure {
    let lower = body.to_lowercase();

    if status == StatusCode::FORBIDDEN && SUSPENSION_MARKERS.iter().any(|m| lower.contains(m)) {
        return Failure::Suspended(body.to_string());
    }

    if status == StatusCode::UNAUTHORIZED {
        return Failure::Expired(snippet(status, body));
    }

    if status == StatusCode::BAD_REQUEST && EXPIRY_MARKERS.iter().any(|m| lower.contains(m)) {
        return Failure::Expired(snippet(status, body));
    }

    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        return Failure::Transient(snippet(status, body));
    }

    Failure::Unknown(snippet(status, body))
}

/// Classify a transport-level error
pub fn classify_transport(err: &reqwest::Error) -> Failure {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        Failure::Transient(format!("network error: {}", err))
    } else if err.is_decode() {
        Failure::Unknown(format!("undecodable response: {}", err))
    } else {
        Failure::Unknown(err.to_string())
    }
}

fn snippet(status: StatusCode, body: &str) -> String {
    let body: String = body.chars().take(200).collect();
    format!("HTTP {}: {}", status.as_u16(), body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_with_suspension_keeps_body_verbatim() {
        let body = r#"{"reason":"TEMPORARILY_SUSPENDED","message":"account disabled"}"#;
        let failure = classify_http(StatusCode::FORBIDDEN, body);
        assert_eq!(failure, Failure::Suspended(body.to_string()));
    }

    #[test]
    fn test_invalid_grant_is_expired() {
        let failure = classify_http(StatusCode::BAD_REQUEST, r#"{"error":"invalid_grant"}"#);
        assert!(matches!(failure, Failure::Expired(_)));
        assert!(!failure.is_retryable());

        let failure = classify_http(StatusCode::UNAUTHORIZED, "");
        assert!(matches!(failure, Failure::Expired(_)));
    }

    #[test]
    fn test_server_errors_are_transient() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::TOO_MANY_REQUESTS,
        ] {
            let failure = classify_http(status, "busy");
            assert!(matches!(failure, Failure::Transient(_)), "{status}");
            assert!(failure.is_retryable());
        }
    }

    #[test]
    fn test_unrecognised_is_unknown() {
        let failure = classify_http(StatusCode::FORBIDDEN, "access denied");
        assert!(matches!(failure, Failure::Unknown(_)));
        assert!(failure.is_retryable());
        assert_eq!(failure.kind(), "unknown");
    }
}
