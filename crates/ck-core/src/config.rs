use std::time::Duration;

use ck_settings::RefreshSettings;

/// Runtime tuning for the lifecycle controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Lead time before `expiresAt` at which a refresh fires
    pub safety_margin: Duration,
    /// Maximum provider calls in flight across accounts
    pub worker_pool_size: usize,
    pub backoff: BackoffPolicy,
    /// How long `stop()` waits for in-flight tasks before cancelling them
    pub shutdown_grace: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self::from(&RefreshSettings::default())
    }
}

impl From<&RefreshSettings> for LifecycleConfig {
    fn from(settings: &RefreshSettings) -> Self {
        Self {
            safety_margin: settings.safety_margin(),
            worker_pool_size: settings.worker_pool_size.max(1),
            backoff: BackoffPolicy {
                base: settings.backoff_base(),
                max: settings.backoff_max(),
                max_retries: settings.max_retries,
            },
            shutdown_grace: settings.shutdown_grace(),
        }
    }
}

/// Exponential backoff with a capped interval and a bounded retry count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    /// Consecutive failures retried before escalating
    pub max_retries: u32,
}

impl BackoffPolicy {
    /// Delay before the retry following the `failures`-th consecutive failure
    ///
    /// Returns `None` once `failures` exceeds `max_retries`.
    pub fn delay_for(&self, failures: u32) -> Option<Duration> {
        if failures == 0 || failures > self.max_retries {
            return None;
        }

        let exponent = (failures - 1).min(31);
        let delay = self
            .base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max);

        Some(delay.min(self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_secs(30),
            max: Duration::from_secs(100),
            max_retries: 4,
        }
    }

    #[test]
    fn test_delay_doubles_until_cap() {
        let policy = policy();
        assert_eq!(policy.delay_for(1), Some(Duration::from_secs(30)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_secs(60)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_secs(100)));
        assert_eq!(policy.delay_for(4), Some(Duration::from_secs(100)));
    }

    #[test]
    fn test_escalates_past_retry_limit() {
        let policy = policy();
        assert_eq!(policy.delay_for(5), None);
        assert_eq!(policy.delay_for(0), None);
    }

    #[test]
    fn test_large_attempt_does_not_overflow() {
        let policy = BackoffPolicy {
            base: Duration::from_secs(30),
            max: Duration::from_secs(1800),
            max_retries: u32::MAX,
        };
        assert_eq!(policy.delay_for(200), Some(Duration::from_secs(1800)));
    }

    #[test]
    fn test_from_settings() {
        let config = LifecycleConfig::from(&RefreshSettings::default());
        assert_eq!(config.safety_margin, Duration::from_secs(300));
        assert_eq!(config.worker_pool_size, 4);
        assert_eq!(config.backoff.max_retries, 5);
        assert_eq!(config.shutdown_grace, Duration::from_secs(10));
    }
}
