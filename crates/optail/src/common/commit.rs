//! In-order commit tracking
//!
//! Workers finish entries out of fetch order. The tracker only releases a
//! position once every entry fetched before it has completed, so the
//! checkpoint never skips an entry whose handler is still running.
//!
//! ```text
//! fetched:   #0 t=5   #1 t=6   #2 t=7
//! complete:            #1       #2      -> nothing released (waiting on #0)
//! complete:  #0                         -> releases t=7
//! ```

use crate::common::Timestamp;
use std::collections::BTreeMap;

/// Watermark over entries registered in fetch order.
#[derive(Debug, Default)]
pub struct CommitTracker {
    next_seq: u64,
    /// seq -> (position, completed)
    in_flight: BTreeMap<u64, (Timestamp, bool)>,
    committed: Option<Timestamp>,
}

impl CommitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fetched entry; returns its sequence number.
    pub fn register(&mut self, position: Timestamp) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight.insert(seq, (position, false));
        seq
    }

    /// Mark an entry completed.
    ///
    /// Returns the new committed position when the contiguous completed
    /// prefix grew.
    pub fn complete(&mut self, seq: u64) -> Option<Timestamp> {
        match self.in_flight.get_mut(&seq) {
            Some(slot) => slot.1 = true,
            None => return None,
        }

        let mut released = None;
        while let Some(entry) = self.in_flight.first_entry() {
            let (position, done) = *entry.get();
            if !done {
                break;
            }
            entry.remove();
            released = Some(position);
        }

        if let Some(position) = released {
            // positions arrive in fetch order, but keep the watermark monotonic
            let committed = self.committed.map_or(position, |c| c.max(position));
            self.committed = Some(committed);
            return Some(committed);
        }
        None
    }

    /// Highest position whose predecessors have all completed.
    pub fn committed(&self) -> Option<Timestamp> {
        self.committed
    }

    /// Entries registered but not yet released.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(seconds: u32) -> Timestamp {
        Timestamp::new(seconds, 0)
    }

    #[test]
    fn test_in_order_completion() {
        let mut tracker = CommitTracker::new();
        let a = tracker.register(ts(1));
        let b = tracker.register(ts(2));

        assert_eq!(tracker.complete(a), Some(ts(1)));
        assert_eq!(tracker.complete(b), Some(ts(2)));
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_out_of_order_completion_waits_for_gap() {
        let mut tracker = CommitTracker::new();
        let a = tracker.register(ts(5));
        let b = tracker.register(ts(6));
        let c = tracker.register(ts(7));

        assert_eq!(tracker.complete(c), None);
        assert_eq!(tracker.complete(b), None);
        assert_eq!(tracker.committed(), None);

        assert_eq!(tracker.complete(a), Some(ts(7)));
        assert_eq!(tracker.committed(), Some(ts(7)));
    }

    #[test]
    fn test_partial_release() {
        let mut tracker = CommitTracker::new();
        let a = tracker.register(ts(1));
        let b = tracker.register(ts(2));
        let c = tracker.register(ts(3));

        assert_eq!(tracker.complete(b), None);
        assert_eq!(tracker.complete(a), Some(ts(2)));
        assert_eq!(tracker.in_flight(), 1);
        assert_eq!(tracker.complete(c), Some(ts(3)));
    }

    #[test]
    fn test_unknown_or_repeated_seq_is_ignored() {
        let mut tracker = CommitTracker::new();
        let a = tracker.register(ts(1));

        assert_eq!(tracker.complete(99), None);
        assert_eq!(tracker.complete(a), Some(ts(1)));
        assert_eq!(tracker.complete(a), None);
    }
}
