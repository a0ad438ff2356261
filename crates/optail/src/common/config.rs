//! Tailer configuration
//!
//! The (filter pattern, label) pair fully determines which checkpoint a
//! tailer resumes from: changing either starts an independent lineage.

use crate::common::{Result, RetryConfig, TailError};
use regex::Regex;
use std::time::Duration;

/// Default await window for cursors reopened after a failure.
pub const DEFAULT_RECONNECT_AWAIT: Duration = Duration::from_secs(5);

/// Tailer configuration
#[derive(Debug, Clone)]
pub struct TailerConfig {
    /// Namespace filter (regular expression, unanchored)
    pub filter_pattern: String,
    /// Checkpoint lineage label
    pub label: String,
    /// Dispatch workers
    pub workers: usize,
    /// Bounded queue length per worker
    pub queue_capacity: usize,
    /// Await window for reconnect cursors
    pub reconnect_await: Duration,
    /// Minimum spacing between checkpoint writes
    pub checkpoint_interval: Duration,
    /// Reconnect backoff
    pub retry: RetryConfig,
}

impl TailerConfig {
    /// Create a new configuration builder
    pub fn builder() -> TailerConfigBuilder {
        TailerConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(TailError::config("Label is required"));
        }
        if self.workers == 0 {
            return Err(TailError::config("At least one dispatch worker is required"));
        }
        if self.queue_capacity == 0 {
            return Err(TailError::config("Queue capacity must be positive"));
        }
        if self.reconnect_await.is_zero() {
            return Err(TailError::config("Reconnect await window must be positive"));
        }
        Regex::new(&self.filter_pattern)?;
        Ok(())
    }
}

/// Builder for TailerConfig
#[derive(Default)]
pub struct TailerConfigBuilder {
    filter_pattern: Option<String>,
    label: Option<String>,
    workers: Option<usize>,
    queue_capacity: Option<usize>,
    reconnect_await: Option<Duration>,
    checkpoint_interval: Option<Duration>,
    retry: Option<RetryConfig>,
}

impl TailerConfigBuilder {
    /// Set the namespace filter pattern
    pub fn filter_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.filter_pattern = Some(pattern.into());
        self
    }

    /// Set the checkpoint label
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the number of dispatch workers
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Set the per-worker queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Set the reconnect await window
    pub fn reconnect_await(mut self, window: Duration) -> Self {
        self.reconnect_await = Some(window);
        self
    }

    /// Set the minimum spacing between checkpoint writes
    pub fn checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = Some(interval);
        self
    }

    /// Set the reconnect retry policy
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<TailerConfig> {
        let config = TailerConfig {
            filter_pattern: self.filter_pattern.unwrap_or_default(),
            label: self
                .label
                .ok_or_else(|| TailError::config("Label is required"))?,
            workers: self.workers.unwrap_or(4),
            queue_capacity: self.queue_capacity.unwrap_or(1024),
            reconnect_await: self.reconnect_await.unwrap_or(DEFAULT_RECONNECT_AWAIT),
            checkpoint_interval: self
                .checkpoint_interval
                .unwrap_or(Duration::from_millis(100)),
            retry: self.retry.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }
}
