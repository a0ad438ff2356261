//! Query predicates for the checkpoint record and the log entries
//!
//! Both selectors evaluate locally ([`CheckpointSelector::matches`],
//! [`EntrySelector::matches`]) and render to a query document for log
//! sources that push predicates down to a remote store:
//!
//! ```text
//! {"$and": [{"ts": {"$gt": {"$timestamp": {"t": 1700000000, "i": 0}}}},
//!           {"ns": {"$regex": "orders.*"}}]}
//! ```

use crate::common::{LogEntry, Result, TailerCheckpoint, Timestamp};
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

/// Locates the checkpoint record of one (filter, label) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointSelector {
    pub filter_pattern: String,
    pub label: String,
}

impl CheckpointSelector {
    pub fn new(filter_pattern: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            filter_pattern: filter_pattern.into(),
            label: label.into(),
        }
    }

    pub fn for_checkpoint(checkpoint: &TailerCheckpoint) -> Self {
        Self::new(&checkpoint.filter_pattern, &checkpoint.label)
    }

    pub fn matches(&self, checkpoint: &TailerCheckpoint) -> bool {
        checkpoint.filter_pattern == self.filter_pattern && checkpoint.label == self.label
    }

    pub fn to_query(&self) -> Value {
        json!({
            "$and": [
                { "filter_pattern": self.filter_pattern },
                { "label": self.label },
            ]
        })
    }
}

/// Selects log entries strictly after a position whose namespace matches the
/// filter pattern.
///
/// The pattern is an unanchored, case-sensitive regular expression; an empty
/// pattern matches every namespace.
#[derive(Debug, Clone)]
pub struct EntrySelector {
    after: Timestamp,
    pattern: String,
    namespace: Regex,
}

impl EntrySelector {
    pub fn new(after: Timestamp, pattern: &str) -> Result<Self> {
        Ok(Self {
            after,
            pattern: pattern.to_string(),
            namespace: Regex::new(pattern)?,
        })
    }

    /// Same namespace filter, starting after `position`.
    pub fn resume_after(&self, position: Timestamp) -> Self {
        let selector = Self {
            after: position,
            pattern: self.pattern.clone(),
            namespace: self.namespace.clone(),
        };
        debug!("Entry selector = {}", selector.to_query());
        selector
    }

    pub fn after(&self) -> Timestamp {
        self.after
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches_namespace(&self, namespace: &str) -> bool {
        self.namespace.is_match(namespace)
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        entry.position > self.after && self.matches_namespace(&entry.namespace)
    }

    pub fn to_query(&self) -> Value {
        json!({
            "$and": [
                { "ts": { "$gt": { "$timestamp": {
                    "t": self.after.seconds,
                    "i": self.after.increment,
                } } } },
                { "ns": { "$regex": self.pattern } },
            ]
        })
    }
}

/// Build both selectors for a checkpoint.
pub fn build_selectors(
    checkpoint: &TailerCheckpoint,
) -> Result<(CheckpointSelector, EntrySelector)> {
    let lookup = CheckpointSelector::for_checkpoint(checkpoint);
    let entries = EntrySelector::new(checkpoint.position, &checkpoint.filter_pattern)?;

    debug!("Checkpoint selector = {}", lookup.to_query());
    debug!("Entry selector = {}", entries.to_query());

    Ok((lookup, entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Document;

    fn entry(seconds: u32, increment: u32, ns: &str) -> LogEntry {
        LogEntry::insert(Timestamp::new(seconds, increment), ns, Document::new())
    }

    fn checkpoint(pattern: &str, position: Timestamp) -> TailerCheckpoint {
        TailerCheckpoint::new(pattern, "etl1", position)
    }

    #[test]
    fn test_checkpoint_selector_matches_pair() {
        let selector = CheckpointSelector::new("orders.*", "etl1");
        assert!(selector.matches(&TailerCheckpoint::new("orders.*", "etl1", Timestamp::MIN)));
        assert!(!selector.matches(&TailerCheckpoint::new("orders.*", "etl2", Timestamp::MIN)));
        assert!(!selector.matches(&TailerCheckpoint::new("users.*", "etl1", Timestamp::MIN)));
    }

    #[test]
    fn test_entry_selector_position_is_exclusive() {
        let (_, selector) = build_selectors(&checkpoint("orders", Timestamp::new(100, 5))).unwrap();

        assert!(!selector.matches(&entry(100, 4, "orders.created")));
        assert!(!selector.matches(&entry(100, 5, "orders.created")));
        assert!(selector.matches(&entry(100, 6, "orders.created")));
        assert!(selector.matches(&entry(101, 0, "orders.created")));
    }

    #[test]
    fn test_entry_selector_regex_is_unanchored() {
        let selector = EntrySelector::new(Timestamp::MIN, "orders").unwrap();
        assert!(selector.matches_namespace("shop.orders"));
        assert!(selector.matches_namespace("orders.created"));
        assert!(!selector.matches_namespace("users.created"));
    }

    #[test]
    fn test_entry_selector_is_case_sensitive() {
        let selector = EntrySelector::new(Timestamp::MIN, "orders.*").unwrap();
        assert!(!selector.matches_namespace("ORDERS.created"));
    }

    #[test]
    fn test_empty_pattern_matches_all() {
        let selector = EntrySelector::new(Timestamp::MIN, "").unwrap();
        assert!(selector.matches(&entry(1, 0, "anything.at_all")));
        assert!(selector.matches(&entry(1, 1, "")));
    }

    #[test]
    fn test_anchored_pattern() {
        let selector = EntrySelector::new(Timestamp::MIN, "^product\\.").unwrap();
        assert!(selector.matches_namespace("product.items"));
        assert!(!selector.matches_namespace("legacy.product.items"));
    }

    #[test]
    fn test_invalid_pattern_is_filter_error() {
        let err = EntrySelector::new(Timestamp::MIN, "orders(").unwrap_err();
        assert!(matches!(err, crate::common::TailError::Filter(_)));
    }

    #[test]
    fn test_resume_after_keeps_pattern() {
        let selector = EntrySelector::new(Timestamp::new(1, 0), "orders").unwrap();
        let resumed = selector.resume_after(Timestamp::new(5, 2));

        assert_eq!(resumed.after(), Timestamp::new(5, 2));
        assert_eq!(resumed.pattern(), "orders");
        assert!(!resumed.matches(&entry(5, 2, "orders.created")));
        assert!(resumed.matches(&entry(5, 3, "orders.created")));
    }

    #[test]
    fn test_query_documents() {
        let (lookup, entries) =
            build_selectors(&checkpoint("orders.*", Timestamp::new(7, 1))).unwrap();

        assert_eq!(
            lookup.to_query(),
            json!({"$and": [{"filter_pattern": "orders.*"}, {"label": "etl1"}]})
        );
        assert_eq!(
            entries.to_query(),
            json!({"$and": [
                {"ts": {"$gt": {"$timestamp": {"t": 7, "i": 1}}}},
                {"ns": {"$regex": "orders.*"}}
            ]})
        );
    }
}
