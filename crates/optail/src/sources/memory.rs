//! In-memory log source
//!
//! Entries live in a shared vector in append (natural) order. Cursors keep
//! an index into it and wait on a watch channel for appends. Scripted open
//! outcomes and cursor faults let tests drive the reconnect path.

use crate::common::{
    AwaitMode, CursorEvent, EntrySelector, LogCursor, LogEntry, LogSource, Result, TailError,
    Timestamp,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Outcome of one [`LogSource::open`] call on a [`MemoryLogSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Open a cursor normally
    Open,
    /// Fail with a retriable connection error
    Refuse,
    /// Fail with a non-retriable permission error
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaultKind {
    Exhaust,
    Fail { retriable: bool },
}

/// Failure injected into the next opened cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorFault {
    after: usize,
    kind: FaultKind,
}

impl CursorFault {
    /// Report [`CursorEvent::Exhausted`] once `entries` entries were delivered.
    pub fn exhaust_after(entries: usize) -> Self {
        Self {
            after: entries,
            kind: FaultKind::Exhaust,
        }
    }

    /// Fail once `entries` entries were delivered.
    pub fn error_after(entries: usize, retriable: bool) -> Self {
        Self {
            after: entries,
            kind: FaultKind::Fail { retriable },
        }
    }
}

/// Append-only in-memory replication log.
pub struct MemoryLogSource {
    entries: Arc<RwLock<Vec<LogEntry>>>,
    appended: watch::Sender<usize>,
    cursor_faults: Mutex<VecDeque<CursorFault>>,
    open_script: Mutex<VecDeque<OpenOutcome>>,
    opened: Mutex<Vec<(Timestamp, AwaitMode)>>,
}

impl MemoryLogSource {
    pub fn new() -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            appended,
            cursor_faults: Mutex::new(VecDeque::new()),
            open_script: Mutex::new(VecDeque::new()),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Append an entry and wake waiting cursors.
    pub fn append(&self, entry: LogEntry) {
        let len = {
            let mut entries = self.entries.write();
            entries.push(entry);
            entries.len()
        };
        self.appended.send_modify(|n| *n = len);
    }

    pub fn extend(&self, entries: impl IntoIterator<Item = LogEntry>) {
        for entry in entries {
            self.append(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue a fault for the next cursor opened.
    pub fn push_cursor_fault(&self, fault: CursorFault) {
        self.cursor_faults.lock().push_back(fault);
    }

    /// Script the outcome of the next open calls; later opens succeed.
    pub fn script_opens(&self, outcomes: impl IntoIterator<Item = OpenOutcome>) {
        self.open_script.lock().extend(outcomes);
    }

    /// Open attempts so far, successful or not.
    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    /// Start position and await mode of every open attempt.
    pub fn opened(&self) -> Vec<(Timestamp, AwaitMode)> {
        self.opened.lock().clone()
    }
}

impl Default for MemoryLogSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogSource for MemoryLogSource {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn open(
        &self,
        selector: &EntrySelector,
        await_mode: AwaitMode,
    ) -> Result<Box<dyn LogCursor>> {
        self.opened.lock().push((selector.after(), await_mode));

        let outcome = self
            .open_script
            .lock()
            .pop_front()
            .unwrap_or(OpenOutcome::Open);
        match outcome {
            OpenOutcome::Open => {}
            OpenOutcome::Refuse => {
                return Err(TailError::connection_refused("memory source refused open"))
            }
            OpenOutcome::Deny => {
                return Err(TailError::permission_denied("memory source denied open"))
            }
        }

        debug!(
            "Opened memory cursor after {} ({} entries)",
            selector.after(),
            self.len()
        );
        Ok(Box::new(MemoryCursor {
            entries: self.entries.clone(),
            appended: self.appended.subscribe(),
            selector: selector.clone(),
            await_mode,
            next_index: 0,
            delivered: 0,
            fault: self.cursor_faults.lock().pop_front(),
        }))
    }
}

struct MemoryCursor {
    entries: Arc<RwLock<Vec<LogEntry>>>,
    appended: watch::Receiver<usize>,
    selector: EntrySelector,
    await_mode: AwaitMode,
    next_index: usize,
    delivered: usize,
    fault: Option<CursorFault>,
}

impl MemoryCursor {
    fn scan(&mut self) -> Option<LogEntry> {
        let entries = self.entries.read();
        while let Some(entry) = entries.get(self.next_index) {
            self.next_index += 1;
            if self.selector.matches(entry) {
                return Some(entry.clone());
            }
        }
        None
    }
}

#[async_trait]
impl LogCursor for MemoryCursor {
    async fn next(&mut self) -> Result<CursorEvent> {
        if let Some(fault) = self.fault {
            if self.delivered >= fault.after {
                return match fault.kind {
                    FaultKind::Exhaust => Ok(CursorEvent::Exhausted),
                    FaultKind::Fail { retriable: true } => {
                        Err(TailError::cursor_lost("memory cursor lost"))
                    }
                    FaultKind::Fail { retriable: false } => {
                        Err(TailError::source("memory cursor failed"))
                    }
                };
            }
        }

        loop {
            // mark seen before scanning so an append racing the scan still wakes us
            self.appended.borrow_and_update();
            if let Some(entry) = self.scan() {
                self.delivered += 1;
                return Ok(CursorEvent::Entry(entry));
            }

            match self.await_mode {
                AwaitMode::Unbounded => {
                    if self.appended.changed().await.is_err() {
                        return Ok(CursorEvent::Exhausted);
                    }
                }
                AwaitMode::Bounded(window) => {
                    match tokio::time::timeout(window, self.appended.changed()).await {
                        Err(_) => return Ok(CursorEvent::Timeout),
                        Ok(Err(_)) => return Ok(CursorEvent::Exhausted),
                        Ok(Ok(())) => {}
                    }
                }
            }
        }
    }
}
