//! Ledger engine configuration.

use std::time::Duration;

/// Retry policy for transactions that fail transiently.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Main ledger configuration.
#[derive(Debug, Clone, Default)]
pub struct LedgerConfig {
    /// Retry policy for balance-mutating transactions.
    pub retry: RetryPolicy,
}

impl LedgerConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.retry.max_attempts == 0 {
            return Err("Retry attempts must be at least 1".to_string());
        }

        if self.retry.base_delay > self.retry.max_delay {
            return Err("Retry base delay cannot exceed max delay".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = LedgerConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = LedgerConfig::default();
        config.retry.base_delay = Duration::from_secs(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(3), Duration::from_millis(40));
        assert_eq!(policy.backoff(10), Duration::from_millis(200));
        assert_eq!(policy.backoff(40), Duration::from_millis(200));
    }
}
