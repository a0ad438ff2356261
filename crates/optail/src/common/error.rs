//! Error types for tailing operations
//!
//! Includes error classification so the tailing loop can tell a dropped
//! cursor (reconnect) apart from a broken deployment (terminate).

use crate::common::resilience::RetriableErrorType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error categories for metrics and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Log source errors (cursor, query, permissions)
    Source,
    /// Checkpoint persistence and integrity errors
    Checkpoint,
    /// Configuration errors (invalid settings, bad filter)
    Configuration,
    /// Connection drops, refusals and timeouts
    Network,
    /// Encoding and decoding of entries and checkpoints
    Serialization,
    /// Anything unclassified
    Other,
}

impl ErrorCategory {
    /// Metric label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Checkpoint => "checkpoint",
            Self::Configuration => "configuration",
            Self::Network => "network",
            Self::Serialization => "serialization",
            Self::Other => "other",
        }
    }
}

/// Tailer errors
#[derive(Error, Debug)]
pub enum TailError {
    /// More than one checkpoint record exists for a (filter, label) pair.
    #[error(
        "Found {count} checkpoint records for filter [{filter_pattern}] and label [{label}]; \
         there must be at most one, repair the checkpoint store and restart"
    )]
    MultipleCheckpoints {
        filter_pattern: String,
        label: String,
        count: usize,
    },

    /// Checkpoint store error
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Namespace filter could not be compiled
    #[error("Filter error: {0}")]
    Filter(String),

    /// Non-recoverable log source error
    #[error("Source error: {0}")]
    Source(String),

    /// Cursor was invalidated by the log source and must be reopened
    #[error("Cursor lost: {0}")]
    CursorLost(String),

    /// Log source refused access
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Reconnect budget exhausted
    #[error("Gave up reconnecting after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Invalid tailer settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed checkpoint or entry
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// JSON decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Source did not answer in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Source closed the connection mid-stream
    #[error("Connection closed")]
    ConnectionClosed,

    /// Source is not accepting connections
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// Internal task failed or stopped unexpectedly
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("{0}")]
    Other(String),
}

impl TailError {
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }

    pub fn filter(msg: impl Into<String>) -> Self {
        Self::Filter(msg.into())
    }

    /// Source failure that reopening the cursor cannot fix.
    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    pub fn cursor_lost(msg: impl Into<String>) -> Self {
        Self::CursorLost(msg.into())
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn connection_refused(msg: impl Into<String>) -> Self {
        Self::ConnectionRefused(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether reopening the cursor may get past this error.
    pub fn is_retriable(&self) -> bool {
        use std::io::ErrorKind;

        match self {
            Self::ConnectionClosed
            | Self::ConnectionRefused(_)
            | Self::Timeout(_)
            | Self::CursorLost(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::TimedOut
                    | ErrorKind::Interrupted
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Kind used to match the error against a retry policy.
    pub fn retriable_error_type(&self) -> Option<RetriableErrorType> {
        match self {
            Self::ConnectionClosed => Some(RetriableErrorType::ConnectionLost),
            Self::ConnectionRefused(_) => Some(RetriableErrorType::ConnectionRefused),
            Self::Timeout(_) => Some(RetriableErrorType::Timeout),
            Self::CursorLost(_) => Some(RetriableErrorType::CursorLost),
            _ if self.is_retriable() => Some(RetriableErrorType::TemporaryFailure),
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MultipleCheckpoints { .. } | Self::Checkpoint(_) => ErrorCategory::Checkpoint,
            Self::Filter(_) | Self::Config(_) => ErrorCategory::Configuration,
            Self::Source(_)
            | Self::CursorLost(_)
            | Self::PermissionDenied(_)
            | Self::RetriesExhausted { .. } => ErrorCategory::Source,
            Self::Timeout(_)
            | Self::ConnectionClosed
            | Self::ConnectionRefused(_)
            | Self::Io(_) => ErrorCategory::Network,
            Self::Serialization(_) | Self::Json(_) => ErrorCategory::Serialization,
            Self::InvalidState(_) | Self::Other(_) => ErrorCategory::Other,
        }
    }

    /// Stable snake_case code, the `code` label of `optail_errors_total`.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MultipleCheckpoints { .. } => "multiple_checkpoints",
            Self::Checkpoint(_) => "checkpoint_error",
            Self::Filter(_) => "filter_error",
            Self::Source(_) => "source_error",
            Self::CursorLost(_) => "cursor_lost",
            Self::PermissionDenied(_) => "permission_denied",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::Config(_) => "config_error",
            Self::Serialization(_) => "serialization_error",
            Self::Json(_) => "json_error",
            Self::Io(_) => "io_error",
            Self::Timeout(_) => "timeout",
            Self::ConnectionClosed => "connection_closed",
            Self::ConnectionRefused(_) => "connection_refused",
            Self::InvalidState(_) => "invalid_state",
            Self::Other(_) => "unknown",
        }
    }
}

impl From<regex::Error> for TailError {
    fn from(e: regex::Error) -> Self {
        Self::Filter(e.to_string())
    }
}

/// Result type for tailing operations
pub type Result<T> = std::result::Result<T, TailError>;
