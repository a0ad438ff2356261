//! Test harness for tailer integration tests
//!
//! Provides a recording handler, entry builders and polling helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use optail::{ChangeHandler, Document, LogEntry, OpKind, Timestamp};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Once;
use std::time::Duration;

static INIT: Once = Once::new();

/// Initialize test logging (idempotent)
pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("optail=debug".parse().unwrap()),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Upper bound for anything a test waits on
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// One handler callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub op: OpKind,
    pub document: Document,
}

/// Handler recording every callback in call order.
#[derive(Default)]
pub struct RecordingHandler {
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.deliveries.lock().len()
    }

    /// `_id` of every delivered document, in delivery order.
    pub fn ids(&self) -> Vec<i64> {
        self.deliveries
            .lock()
            .iter()
            .filter_map(|d| d.document.get("_id").and_then(Value::as_i64))
            .collect()
    }

    /// Wait until at least `count` callbacks ran.
    pub async fn wait_for(&self, count: usize) {
        wait_until(|| self.len() >= count).await;
    }

    fn record(&self, op: OpKind, document: &Document) {
        self.deliveries.lock().push(Delivery {
            op,
            document: document.clone(),
        });
    }
}

#[async_trait]
impl ChangeHandler for RecordingHandler {
    async fn on_insert(&self, inserted: &Document) {
        self.record(OpKind::Insert, inserted);
    }

    async fn on_update(&self, updated: &Document) {
        self.record(OpKind::Update, updated);
    }

    async fn on_delete(&self, deleted: &Document) {
        self.record(OpKind::Delete, deleted);
    }
}

/// Poll `condition` until it holds, failing the test after [`WAIT_TIMEOUT`].
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Build a document from a JSON object literal.
pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

pub fn ts(seconds: u32) -> Timestamp {
    Timestamp::new(seconds, 0)
}

pub fn insert(seconds: u32, ns: &str, id: i64) -> LogEntry {
    LogEntry::insert(ts(seconds), ns, doc(json!({ "_id": id })))
}

pub fn update(seconds: u32, ns: &str, id: i64, change: Value) -> LogEntry {
    LogEntry::update(ts(seconds), ns, doc(json!({ "_id": id })), doc(change))
}

pub fn delete(seconds: u32, ns: &str, id: i64) -> LogEntry {
    LogEntry::delete(ts(seconds), ns, doc(json!({ "_id": id })))
}
