//! Change handler trait
//!
//! Implemented by applications to receive insert/update/delete events.

use crate::common::{Document, LogEntry, OpKind};
use async_trait::async_trait;
use std::sync::Arc;

/// Receives the payload of every dispatched log entry.
///
/// Callbacks return nothing: failures are the handler's own concern. A
/// panicking callback is caught and logged by the dispatcher and does not
/// stop the tailer.
///
/// Entries for the same document are delivered in log order; entries for
/// different documents may be delivered concurrently.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    /// Called with the inserted document.
    async fn on_insert(&self, inserted: &Document);

    /// Called with the update description.
    async fn on_update(&self, updated: &Document);

    /// Called with the key of the deleted document.
    async fn on_delete(&self, deleted: &Document);

    /// Route an entry to the callback for its operation kind.
    ///
    /// Returns `false` without calling anything for unknown operation kinds.
    async fn on_entry(&self, entry: &LogEntry) -> bool {
        match entry.op {
            OpKind::Insert => self.on_insert(&entry.payload).await,
            OpKind::Update => self.on_update(&entry.payload).await,
            OpKind::Delete => self.on_delete(&entry.payload).await,
            OpKind::Unknown(_) => return false,
        }
        true
    }
}

/// Shared handler.
pub type SharedHandler = Arc<dyn ChangeHandler>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Timestamp;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(&'static str, Document)>>,
    }

    #[async_trait]
    impl ChangeHandler for Recorder {
        async fn on_insert(&self, inserted: &Document) {
            self.calls.lock().push(("insert", inserted.clone()));
        }

        async fn on_update(&self, updated: &Document) {
            self.calls.lock().push(("update", updated.clone()));
        }

        async fn on_delete(&self, deleted: &Document) {
            self.calls.lock().push(("delete", deleted.clone()));
        }
    }

    fn payload(n: i64) -> Document {
        let mut doc = Document::new();
        doc.insert("_id".into(), json!(n));
        doc
    }

    #[tokio::test]
    async fn test_routes_each_kind_to_its_callback() {
        let recorder = Recorder::default();
        let ts = Timestamp::new(1, 0);

        assert!(recorder.on_entry(&LogEntry::insert(ts, "a.b", payload(1))).await);
        assert!(
            recorder
                .on_entry(&LogEntry::update(ts, "a.b", payload(2), payload(3)))
                .await
        );
        assert!(recorder.on_entry(&LogEntry::delete(ts, "a.b", payload(4))).await);

        let calls = recorder.calls.lock().clone();
        assert_eq!(
            calls,
            vec![
                ("insert", payload(1)),
                ("update", payload(3)),
                ("delete", payload(4)),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_kind_calls_nothing() {
        let recorder = Recorder::default();
        let entry = LogEntry::new(
            Timestamp::new(1, 0),
            OpKind::from_code("n"),
            "a.b",
            payload(1),
        );

        assert!(!recorder.on_entry(&entry).await);
        assert!(recorder.calls.lock().is_empty());
    }
}
