//! Log source traits
//!
//! The driver-facing seam: a [`LogSource`] opens tailable cursors over the
//! replication log, a [`LogCursor`] yields entries in natural (arrival)
//! order and blocks waiting for new ones.

use crate::common::{EntrySelector, LogEntry, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// How long a cursor waits for new entries before reporting a soft timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitMode {
    /// Block until an entry arrives
    Unbounded,
    /// Report [`CursorEvent::Timeout`] after the window elapses without data
    Bounded(Duration),
}

/// Outcome of one cursor fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorEvent {
    /// Next matching entry
    Entry(LogEntry),
    /// Await window elapsed with no new entry; the cursor is still valid
    Timeout,
    /// The cursor is dead and must be reopened
    Exhausted,
}

/// Tailable, await-data cursor.
#[async_trait]
pub trait LogCursor: Send {
    /// Fetch the next entry matching the selector the cursor was opened with.
    ///
    /// Errors are hard cursor failures; [`TailError::is_retriable`] tells
    /// whether reopening can help.
    ///
    /// [`TailError::is_retriable`]: crate::common::TailError::is_retriable
    async fn next(&mut self) -> Result<CursorEvent>;
}

/// Replication log driver.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Short name used in logs (e.g. `memory`, `jsonl:/var/log/oplog.jsonl`)
    fn describe(&self) -> String;

    /// Open a cursor over entries matching `selector`, sorted by natural order.
    async fn open(
        &self,
        selector: &EntrySelector,
        await_mode: AwaitMode,
    ) -> Result<Box<dyn LogCursor>>;
}

/// Shared log source.
pub type SharedLogSource = Arc<dyn LogSource>;
