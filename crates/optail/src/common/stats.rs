//! # Tailer Statistics
//!
//! Lock-free counters for one tailer, mirrored to the `metrics` crate facade
//! (labelled by tailer label) so any installed exporter picks them up.
//!
//! ```ignore
//! let stats = tailer.stats();
//! let snapshot = stats.snapshot();
//! println!("dispatched {} entries", snapshot.dispatched());
//! ```

use crate::common::{OpKind, TailError};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one tailer.
#[derive(Debug)]
pub struct TailerStats {
    label: String,
    fetched: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    unknown_ops: AtomicU64,
    handler_panics: AtomicU64,
    reconnects: AtomicU64,
    checkpoint_writes: AtomicU64,
    checkpoint_errors: AtomicU64,
    errors: AtomicU64,
}

impl TailerStats {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            fetched: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            unknown_ops: AtomicU64::new(0),
            handler_panics: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            checkpoint_writes: AtomicU64::new(0),
            checkpoint_errors: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn record_fetched(&self) {
        self.fetched.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("optail_entries_fetched_total", "label" => self.label.clone())
            .increment(1);
    }

    pub fn record_dispatched(&self, op: &OpKind) {
        let counter = match op {
            OpKind::Insert => &self.inserts,
            OpKind::Update => &self.updates,
            OpKind::Delete => &self.deletes,
            OpKind::Unknown(_) => &self.unknown_ops,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            "optail_entries_dispatched_total",
            "label" => self.label.clone(),
            "op" => op.as_str()
        )
        .increment(1);
    }

    pub fn record_handler_panic(&self) {
        self.handler_panics.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("optail_handler_panics_total", "label" => self.label.clone())
            .increment(1);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("optail_reconnects_total", "label" => self.label.clone()).increment(1);
    }

    pub fn record_checkpoint_write(&self) {
        self.checkpoint_writes.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("optail_checkpoint_writes_total", "label" => self.label.clone())
            .increment(1);
    }

    pub fn record_checkpoint_error(&self) {
        self.checkpoint_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("optail_checkpoint_errors_total", "label" => self.label.clone())
            .increment(1);
    }

    /// Count a cursor, reconnect, checkpoint or fatal error under its code.
    pub fn record_error(&self, error: &TailError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            "optail_errors_total",
            "label" => self.label.clone(),
            "code" => error.error_code(),
            "category" => error.category().as_str()
        )
        .increment(1);
    }

    pub fn snapshot(&self) -> TailerStatsSnapshot {
        TailerStatsSnapshot {
            fetched: self.fetched.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            unknown_ops: self.unknown_ops.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            checkpoint_writes: self.checkpoint_writes.load(Ordering::Relaxed),
            checkpoint_errors: self.checkpoint_errors.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`TailerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TailerStatsSnapshot {
    pub fetched: u64,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub unknown_ops: u64,
    pub handler_panics: u64,
    pub reconnects: u64,
    pub checkpoint_writes: u64,
    pub checkpoint_errors: u64,
    pub errors: u64,
}

impl TailerStatsSnapshot {
    /// Entries handed to a handler callback.
    pub fn dispatched(&self) -> u64 {
        self.inserts + self.updates + self.deletes
    }
}
