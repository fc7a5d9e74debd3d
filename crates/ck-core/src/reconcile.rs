use std::time::Duration;

use ck_auth::{CheckOutcome, Credential, Failure, RefreshOutcome, Subscription};

use crate::config::BackoffPolicy;

/// What applying a provider outcome should do to an account
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Store the new credential, clear faults, re-arm from its expiry
    Refreshed(Credential),
    /// Refresh token rejected; halt until the user signs in again
    NeedsReauth { reason: String },
    /// Provider banned the account; halt and keep the raw detail
    Suspended { detail: String },
    /// Retry after `delay`; `attempt` counts consecutive failures
    Retry {
        attempt: u32,
        delay: Duration,
        failure: Failure,
    },
    /// Retry budget exhausted; halt in a persistent-error state
    Escalate { failures: u32, failure: Failure },
    /// Check succeeded; clear faults and cache the subscription
    Validated { subscription: Option<Subscription> },
    /// Check could not reach a verdict; scheduling is unaffected
    Inconclusive { failure: Failure },
}

/// Maps classified provider outcomes to registry decisions
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    backoff: BackoffPolicy,
}

impl Reconciler {
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self { backoff }
    }

    /// Decide on a refresh outcome for an account holding `current`
    ///
    /// `failures` is the count of consecutive failures before this outcome.
    pub fn refresh(&self, current: &Credential, outcome: RefreshOutcome, failures: u32) -> Decision {
        match outcome {
            RefreshOutcome::Refreshed(credential) if credential.expires_at > current.expires_at => {
                Decision::Refreshed(credential)
            }
            RefreshOutcome::Refreshed(credential) => {
                // Accepting it would move expiry backwards
                let failure = Failure::Unknown(format!(
                    "refreshed credential does not extend expiry ({} <= {})",
                    credential.expires_at.timestamp_millis(),
                    current.expires_at.timestamp_millis()
                ));
                self.failed(failure, failures)
            }
            RefreshOutcome::Failed(failure) => self.failed(failure, failures),
        }
    }

    /// Decide on a validation check outcome
    pub fn check(&self, outcome: CheckOutcome) -> Decision {
        match outcome {
            CheckOutcome::Valid(report) => Decision::Validated {
                subscription: report.subscription,
            },
            CheckOutcome::Failed(Failure::Expired(reason)) => Decision::NeedsReauth { reason },
            CheckOutcome::Failed(Failure::Suspended(detail)) => Decision::Suspended { detail },
            CheckOutcome::Failed(failure) => Decision::Inconclusive { failure },
        }
    }

    fn failed(&self, failure: Failure, failures: u32) -> Decision {
        match failure {
            Failure::Expired(reason) => Decision::NeedsReauth { reason },
            Failure::Suspended(detail) => Decision::Suspended { detail },
            failure => {
                let attempt = failures.saturating_add(1);
                match self.backoff.delay_for(attempt) {
                    Some(delay) => Decision::Retry {
                        attempt,
                        delay,
                        failure,
                    },
                    None => Decision::Escalate {
                        failures: attempt,
                        failure,
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use ck_auth::{AuthMethod, CheckReport};

    fn reconciler() -> Reconciler {
        Reconciler::new(BackoffPolicy {
            base: Duration::from_secs(10),
            max: Duration::from_secs(25),
            max_retries: 3,
        })
    }

    fn credential(expires_at_ms: i64) -> Credential {
        Credential {
            access_token: format!("access-{expires_at_ms}"),
            refresh_token: "refresh".to_string(),
            client_id: Some("client".to_string()),
            client_secret: Some("secret".to_string()),
            region: "us-east-1".to_string(),
            provider: Some("BuilderId".to_string()),
            auth_method: AuthMethod::Idc,
            profile_arn: None,
            expires_at: DateTime::<Utc>::from_timestamp_millis(expires_at_ms).unwrap(),
        }
    }

    #[test]
    fn test_refreshed_with_later_expiry_is_applied() {
        let current = credential(1_000);
        let next = credential(2_000);

        let decision = reconciler().refresh(&current, RefreshOutcome::Refreshed(next.clone()), 2);
        assert_eq!(decision, Decision::Refreshed(next));
    }

    #[test]
    fn test_refreshed_without_later_expiry_is_a_failure() {
        let current = credential(2_000);
        let decision =
            reconciler().refresh(&current, RefreshOutcome::Refreshed(credential(2_000)), 0);

        assert!(matches!(
            decision,
            Decision::Retry {
                attempt: 1,
                failure: Failure::Unknown(_),
                ..
            }
        ));
    }

    #[test]
    fn test_terminal_failures_do_not_retry() {
        let current = credential(1_000);
        let reconciler = reconciler();

        assert_eq!(
            reconciler.refresh(
                &current,
                RefreshOutcome::Failed(Failure::Expired("invalid_grant".to_string())),
                0
            ),
            Decision::NeedsReauth {
                reason: "invalid_grant".to_string()
            }
        );
        assert_eq!(
            reconciler.refresh(
                &current,
                RefreshOutcome::Failed(Failure::Suspended("account disabled".to_string())),
                2
            ),
            Decision::Suspended {
                detail: "account disabled".to_string()
            }
        );
    }

    #[test]
    fn test_transient_failures_back_off_then_escalate() {
        let current = credential(1_000);
        let reconciler = reconciler();
        let transient = || RefreshOutcome::Failed(Failure::Transient("HTTP 503".to_string()));

        let delays: Vec<Duration> = (0..3)
            .map(|failures| match reconciler.refresh(&current, transient(), failures) {
                Decision::Retry { delay, .. } => delay,
                other => panic!("{other:?}"),
            })
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(10),
                Duration::from_secs(20),
                Duration::from_secs(25)
            ]
        );

        assert_eq!(
            reconciler.refresh(&current, transient(), 3),
            Decision::Escalate {
                failures: 4,
                failure: Failure::Transient("HTTP 503".to_string())
            }
        );
    }

    #[test]
    fn test_check_outcomes() {
        let reconciler = reconciler();
        let subscription = Subscription {
            plan_type: Some("PRO".to_string()),
            title: None,
        };

        assert_eq!(
            reconciler.check(CheckOutcome::Valid(CheckReport {
                subscription: Some(subscription.clone())
            })),
            Decision::Validated {
                subscription: Some(subscription)
            }
        );
        assert!(matches!(
            reconciler.check(CheckOutcome::Failed(Failure::Unknown("?".to_string()))),
            Decision::Inconclusive { .. }
        ));
    }
}
