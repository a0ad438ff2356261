//! Handler that logs every change it receives.

use async_trait::async_trait;
use optail::{ChangeHandler, Document};
use tracing::info;

/// Logs inserted, updated and deleted documents at info level.
#[derive(Debug, Clone)]
pub struct LoggingHandler {
    label: String,
}

impl LoggingHandler {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Compact JSON rendering of a document.
pub fn render(document: &Document) -> String {
    serde_json::to_string(document).unwrap_or_else(|_| format!("{:?}", document))
}

#[async_trait]
impl ChangeHandler for LoggingHandler {
    async fn on_insert(&self, inserted: &Document) {
        info!(label = %self.label, "Inserted: {}", render(inserted));
    }

    async fn on_update(&self, updated: &Document) {
        info!(label = %self.label, "Updated: {}", render(updated));
    }

    async fn on_delete(&self, deleted: &Document) {
        info!(label = %self.label, "Deleted: {}", render(deleted));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optail::{LogEntry, OpKind, Timestamp};
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_render_is_compact_json() {
        let rendered = render(&doc(json!({ "_id": 1, "sku": "a-1" })));
        assert_eq!(rendered, r#"{"_id":1,"sku":"a-1"}"#);
    }

    #[tokio::test]
    async fn test_handles_every_known_op() {
        let handler = LoggingHandler::new("cli");
        let id = doc(json!({ "_id": 7 }));

        for entry in [
            LogEntry::insert(Timestamp::new(1, 0), "shop.orders", id.clone()),
            LogEntry::update(
                Timestamp::new(2, 0),
                "shop.orders",
                id.clone(),
                doc(json!({ "$set": { "paid": true } })),
            ),
            LogEntry::delete(Timestamp::new(3, 0), "shop.orders", id.clone()),
        ] {
            assert!(handler.on_entry(&entry).await);
        }

        let noop = LogEntry::new(Timestamp::new(4, 0), OpKind::from_code("n"), "shop.orders", id);
        assert!(!handler.on_entry(&noop).await);
        assert_eq!(handler.label(), "cli");
    }
}
