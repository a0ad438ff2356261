//! Reconnect policy for the tailing loop
//!
//! Bounded exponential backoff with jitter, so a tailer facing a log source
//! that is down does not spin reopening cursors.
//!
//! ```text
//! attempt:   0      1      2      3     ...
//! delay:   base   2·base 4·base 8·base  ... capped at max_delay, ± jitter
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Failure kinds the tailer may reconnect after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetriableErrorType {
    /// Connection dropped mid-stream
    ConnectionLost,
    /// Log source refused the connection
    ConnectionRefused,
    /// Request to the log source timed out
    Timeout,
    /// Cursor killed or invalidated by the log source
    CursorLost,
    /// Transient I/O failure of any other kind
    TemporaryFailure,
}

impl RetriableErrorType {
    pub const ALL: [RetriableErrorType; 5] = [
        Self::ConnectionLost,
        Self::ConnectionRefused,
        Self::Timeout,
        Self::CursorLost,
        Self::TemporaryFailure,
    ];

    /// Every kind; the default policy retries them all.
    pub fn defaults() -> HashSet<Self> {
        Self::ALL.into_iter().collect()
    }
}

/// How many consecutive reconnect attempts are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBudget {
    /// Never give up
    Unlimited,
    /// Give up after this many attempts; `Limited(0)` disables reconnects
    Limited(u32),
}

impl RetryBudget {
    /// Budget from the signed form used in config files (negative = unlimited).
    pub fn from_signed(max_retries: i64) -> Self {
        u32::try_from(max_retries).map_or(Self::Unlimited, Self::Limited)
    }
}

/// Reconnect backoff policy.
///
/// # Example
///
/// ```rust
/// use optail::common::{RetriableErrorType, RetryConfig};
/// use std::time::Duration;
///
/// let config = RetryConfig::builder()
///     .max_retries(10)
///     .retry_delay(Duration::from_millis(200))
///     .max_delay(Duration::from_secs(30))
///     .jitter(0.25)
///     .build();
///
/// assert_eq!(config.max_retries(), Some(10));
/// assert!(config.is_retriable(&RetriableErrorType::CursorLost));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    budget: RetryBudget,
    retry_delay: Duration,
    max_delay: Duration,
    /// Fraction of the delay added or removed, in [0, 1]
    jitter: f64,
    retriable_errors: HashSet<RetriableErrorType>,
}

impl Default for RetryConfig {
    /// A tailer is expected to outlive log source outages, so reconnects
    /// never give up by default.
    fn default() -> Self {
        Self {
            budget: RetryBudget::Unlimited,
            retry_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
            retriable_errors: RetriableErrorType::defaults(),
        }
    }
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    /// Policy that never reconnects.
    pub fn disabled() -> Self {
        Self {
            budget: RetryBudget::Limited(0),
            ..Default::default()
        }
    }

    pub fn budget(&self) -> RetryBudget {
        self.budget
    }

    /// Attempt limit, `None` when unlimited.
    pub fn max_retries(&self) -> Option<u32> {
        match self.budget {
            RetryBudget::Unlimited => None,
            RetryBudget::Limited(n) => Some(n),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    pub fn is_enabled(&self) -> bool {
        self.budget != RetryBudget::Limited(0)
    }

    pub fn is_infinite(&self) -> bool {
        self.budget == RetryBudget::Unlimited
    }

    pub fn is_retriable(&self, error_type: &RetriableErrorType) -> bool {
        self.retriable_errors.contains(error_type)
    }

    /// Whether attempt number `attempt` (0-based) is within budget.
    pub fn should_retry(&self, attempt: u32) -> bool {
        match self.budget {
            RetryBudget::Unlimited => true,
            RetryBudget::Limited(limit) => attempt < limit,
        }
    }

    /// Backoff before attempt number `attempt` (0-based).
    ///
    /// Jitter is deterministic per attempt so tests can bound it; successive
    /// attempts still spread over the whole jitter window.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(31);
        let delay = self.retry_delay.saturating_mul(factor).min(self.max_delay);
        if self.jitter == 0.0 {
            return delay;
        }

        // golden-ratio low-discrepancy sequence in [-1, 1)
        let spread = (f64::from(attempt) * 0.618_033_988_749_895).fract() * 2.0 - 1.0;
        let secs = delay.as_secs_f64() * (1.0 + self.jitter * spread);
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Builder for [`RetryConfig`]; unset fields keep the defaults.
#[derive(Debug, Clone, Default)]
pub struct RetryConfigBuilder {
    config: Option<RetryConfig>,
}

impl RetryConfigBuilder {
    fn edit(mut self, apply: impl FnOnce(&mut RetryConfig)) -> Self {
        apply(self.config.get_or_insert_with(RetryConfig::default));
        self
    }

    /// Give up after `attempts` consecutive failed reconnects.
    pub fn max_retries(self, attempts: u32) -> Self {
        self.edit(|c| c.budget = RetryBudget::Limited(attempts))
    }

    pub fn budget(self, budget: RetryBudget) -> Self {
        self.edit(|c| c.budget = budget)
    }

    pub fn retry_delay(self, delay: Duration) -> Self {
        self.edit(|c| c.retry_delay = delay)
    }

    pub fn max_delay(self, delay: Duration) -> Self {
        self.edit(|c| c.max_delay = delay)
    }

    /// Jitter fraction, clamped to [0, 1].
    pub fn jitter(self, jitter: f64) -> Self {
        self.edit(|c| c.jitter = jitter.clamp(0.0, 1.0))
    }

    /// Restrict which failure kinds are retried.
    pub fn retriable_errors(self, errors: HashSet<RetriableErrorType>) -> Self {
        self.edit(|c| c.retriable_errors = errors)
    }

    pub fn build(self) -> RetryConfig {
        self.config.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_never_gives_up() {
        let config = RetryConfig::default();
        assert!(config.is_infinite());
        assert_eq!(config.max_retries(), None);
        assert!(config.should_retry(u32::MAX));
    }

    #[test]
    fn test_disabled() {
        let config = RetryConfig::disabled();
        assert!(!config.is_enabled());
        assert!(!config.should_retry(0));
    }

    #[test]
    fn test_limited_budget() {
        let config = RetryConfig::builder().max_retries(3).build();
        assert!(config.should_retry(0));
        assert!(config.should_retry(2));
        assert!(!config.should_retry(3));
    }

    #[test]
    fn test_budget_from_signed() {
        assert_eq!(RetryBudget::from_signed(-1), RetryBudget::Unlimited);
        assert_eq!(RetryBudget::from_signed(0), RetryBudget::Limited(0));
        assert_eq!(RetryBudget::from_signed(7), RetryBudget::Limited(7));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let config = RetryConfig::builder()
            .retry_delay(Duration::from_millis(100))
            .max_delay(Duration::from_secs(1))
            .jitter(0.0)
            .build();

        let delays: Vec<_> = [0, 1, 3, 4, 60]
            .into_iter()
            .map(|a| config.delay_for_attempt(a))
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(800),
                Duration::from_secs(1),
                Duration::from_secs(1),
            ]
        );
    }

    #[test]
    fn test_jitter_window() {
        let config = RetryConfig::builder()
            .retry_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(1))
            .jitter(0.5)
            .build();

        let delays: Vec<_> = (0..20).map(|a| config.delay_for_attempt(a)).collect();
        assert!(delays
            .iter()
            .all(|d| *d >= Duration::from_millis(500) && *d <= Duration::from_millis(1500)));
        // not a constant offset
        assert!(delays.iter().any(|d| *d < Duration::from_secs(1)));
        assert!(delays.iter().any(|d| *d > Duration::from_secs(1)));
    }

    #[test]
    fn test_builder_clamps_and_filters() {
        let config = RetryConfig::builder()
            .jitter(7.0)
            .retriable_errors([RetriableErrorType::Timeout].into_iter().collect())
            .build();

        assert_eq!(config.jitter(), 1.0);
        assert!(config.is_retriable(&RetriableErrorType::Timeout));
        assert!(!config.is_retriable(&RetriableErrorType::CursorLost));
    }
}
