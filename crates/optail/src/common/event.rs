//! Log entry representation
//!
//! A [`LogEntry`] is one record of the replication log. Field names on the
//! wire follow the oplog convention (`ts`, `op`, `ns`, `o`, `o2`) so that
//! entries exported from a database round-trip without a mapping layer.
//!
//! ```text
//! {"ts":{"t":1700000000,"i":1},"op":"i","ns":"orders.created","o":{"_id":1,"total":12}}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Field name to value mapping carried by log entries.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Position in the replication log.
///
/// A (seconds, increment) pair ordered lexicographically: entries written in
/// the same second are told apart by the increment.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp {
    /// Seconds since the Unix epoch
    #[serde(rename = "t")]
    pub seconds: u32,
    /// Ordinal within the second
    #[serde(rename = "i")]
    pub increment: u32,
}

impl Timestamp {
    /// Smallest possible position; every entry is after it.
    pub const MIN: Timestamp = Timestamp {
        seconds: 0,
        increment: 0,
    };

    pub const fn new(seconds: u32, increment: u32) -> Self {
        Self { seconds, increment }
    }

    /// Current wall-clock second with increment 0.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self::new(u32::try_from(secs).unwrap_or(u32::MAX), 0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.seconds, self.increment)
    }
}

/// Operation recorded by a log entry.
///
/// Codes outside the recognized set (no-ops, commands) are kept as
/// [`OpKind::Unknown`] so the dispatcher can drop them explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OpKind {
    /// Document inserted (`"i"`)
    Insert,
    /// Document updated (`"u"`)
    Update,
    /// Document deleted (`"d"`)
    Delete,
    /// Any other operation code
    Unknown(String),
}

impl OpKind {
    pub fn from_code(code: &str) -> Self {
        match code {
            "i" => Self::Insert,
            "u" => Self::Update,
            "d" => Self::Delete,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Insert => "i",
            Self::Update => "u",
            Self::Delete => "d",
            Self::Unknown(code) => code,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    /// Metric-safe name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl From<String> for OpKind {
    fn from(code: String) -> Self {
        Self::from_code(&code)
    }
}

impl From<OpKind> for String {
    fn from(op: OpKind) -> Self {
        op.code().to_string()
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One replication log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the log
    #[serde(rename = "ts")]
    pub position: Timestamp,
    /// Operation kind
    pub op: OpKind,
    /// `database.collection` the entry belongs to
    #[serde(rename = "ns")]
    pub namespace: String,
    /// Inserted document, update description, or deleted document key
    #[serde(rename = "o", default)]
    pub payload: Document,
    /// Pre-update document reference (updates only)
    #[serde(rename = "o2", default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Document>,
}

impl LogEntry {
    pub fn new(
        position: Timestamp,
        op: OpKind,
        namespace: impl Into<String>,
        payload: Document,
    ) -> Self {
        Self {
            position,
            op,
            namespace: namespace.into(),
            payload,
            target: None,
        }
    }

    /// Create an insert entry.
    pub fn insert(position: Timestamp, namespace: impl Into<String>, document: Document) -> Self {
        Self::new(position, OpKind::Insert, namespace, document)
    }

    /// Create an update entry. `target` identifies the updated document.
    pub fn update(
        position: Timestamp,
        namespace: impl Into<String>,
        target: Document,
        change: Document,
    ) -> Self {
        Self {
            target: Some(target),
            ..Self::new(position, OpKind::Update, namespace, change)
        }
    }

    /// Create a delete entry.
    pub fn delete(position: Timestamp, namespace: impl Into<String>, key: Document) -> Self {
        Self::new(position, OpKind::Delete, namespace, key)
    }

    /// Identifier of the affected document.
    ///
    /// Updates carry it in the target reference; other operations carry it in
    /// the payload.
    pub fn document_id(&self) -> Option<&serde_json::Value> {
        self.target
            .as_ref()
            .and_then(|t| t.get("_id"))
            .or_else(|| self.payload.get("_id"))
    }
}
