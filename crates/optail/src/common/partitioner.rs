//! Worker assignment for dispatched entries
//!
//! Entries are hashed on `namespace` + document id so that every entry of
//! one document lands on the same worker and is handled in log order.
//! Entries without a document id hash on the namespace alone.

use crate::common::LogEntry;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Maps entries onto `num_workers` dispatch workers.
#[derive(Debug, Clone)]
pub struct Partitioner {
    num_workers: usize,
}

impl Partitioner {
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Worker index for an entry.
    pub fn partition(&self, entry: &LogEntry) -> usize {
        if self.num_workers == 1 {
            return 0;
        }

        let mut hasher = DefaultHasher::new();
        entry.namespace.hash(&mut hasher);
        if let Some(id) = entry.document_id() {
            // serde_json::Value is not Hash; its canonical text form is stable
            id.to_string().hash(&mut hasher);
        }
        (hasher.finish() % self.num_workers as u64) as usize
    }
}
