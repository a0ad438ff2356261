//! Entry dispatch
//!
//! Fetched entries are partitioned onto a small pool of workers, each fed by
//! a bounded queue. A full queue blocks the fetch loop (backpressure).
//!
//! ```text
//!               ┌──────────┐   ┌──────────┐
//!  fetch loop ─►│ queue #0 ├──►│ worker 0 ├──┐
//!     │         └──────────┘   └──────────┘  │   ┌───────────────┐
//!     │         ┌──────────┐   ┌──────────┐  ├──►│ CommitTracker ├──► checkpoint
//!     └────────►│ queue #1 ├──►│ worker 1 ├──┘   └───────────────┘
//!               └──────────┘   └──────────┘
//! ```
//!
//! A worker reports completion only after the handler callback returned (or
//! panicked); the [`CommitTracker`] turns completions into a checkpoint
//! position that never passes an unfinished entry.

use crate::common::{
    ChangeHandler, CommitTracker, LogEntry, Partitioner, Result, SharedHandler, TailError,
    TailerStats, Timestamp,
};
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

struct Job {
    seq: u64,
    entry: LogEntry,
}

/// Worker pool delivering entries to a [`ChangeHandler`].
pub struct Dispatcher {
    queues: Vec<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    partitioner: Partitioner,
    tracker: Arc<Mutex<CommitTracker>>,
}

impl Dispatcher {
    /// Start `workers` workers with `queue_capacity` slots each.
    ///
    /// Committed positions are published on `commits`.
    pub fn spawn(
        handler: SharedHandler,
        workers: usize,
        queue_capacity: usize,
        commits: watch::Sender<Timestamp>,
        stats: Arc<TailerStats>,
    ) -> Self {
        let partitioner = Partitioner::new(workers);
        let tracker = Arc::new(Mutex::new(CommitTracker::new()));
        let commits = Arc::new(commits);

        let mut queues = Vec::with_capacity(partitioner.num_workers());
        let mut handles = Vec::with_capacity(partitioner.num_workers());
        for id in 0..partitioner.num_workers() {
            let (tx, rx) = mpsc::channel(queue_capacity.max(1));
            queues.push(tx);
            handles.push(tokio::spawn(run_worker(
                id,
                rx,
                handler.clone(),
                tracker.clone(),
                commits.clone(),
                stats.clone(),
            )));
        }

        debug!("Started {} dispatch workers", handles.len());

        Self {
            queues,
            workers: handles,
            partitioner,
            tracker,
        }
    }

    /// Queue an entry for its worker, waiting for queue space.
    ///
    /// Entries must be dispatched in fetch order. Dropping the returned
    /// future before it completes leaves no trace of the entry.
    pub async fn dispatch(&self, entry: LogEntry) -> Result<()> {
        let queue = &self.queues[self.partitioner.partition(&entry)];
        let permit = queue
            .reserve()
            .await
            .map_err(|_| TailError::InvalidState("Dispatch worker stopped".into()))?;

        let seq = self.tracker.lock().register(entry.position);
        permit.send(Job { seq, entry });
        Ok(())
    }

    /// Entries queued or being handled.
    pub fn in_flight(&self) -> usize {
        self.tracker.lock().in_flight()
    }

    /// Close the queues and wait for workers to drain them.
    pub async fn shutdown(self) {
        drop(self.queues);
        for handle in self.workers {
            if let Err(e) = handle.await {
                error!("Dispatch worker failed: {}", e);
            }
        }
    }
}

async fn run_worker(
    id: usize,
    mut queue: mpsc::Receiver<Job>,
    handler: SharedHandler,
    tracker: Arc<Mutex<CommitTracker>>,
    commits: Arc<watch::Sender<Timestamp>>,
    stats: Arc<TailerStats>,
) {
    while let Some(job) = queue.recv().await {
        handle_entry(handler.as_ref(), &job.entry, &stats).await;

        let released = tracker.lock().complete(job.seq);
        if let Some(position) = released {
            commits.send_if_modified(|current| {
                if position > *current {
                    *current = position;
                    true
                } else {
                    false
                }
            });
        }
    }
    debug!("Dispatch worker {} stopped", id);
}

/// Deliver one entry, isolating handler panics.
async fn handle_entry(handler: &dyn ChangeHandler, entry: &LogEntry, stats: &TailerStats) {
    if !entry.op.is_known() {
        warn!(
            "Dropping entry at {} in {} with unrecognized op [{}]",
            entry.position, entry.namespace, entry.op
        );
        stats.record_dispatched(&entry.op);
        return;
    }

    match AssertUnwindSafe(handler.on_entry(entry)).catch_unwind().await {
        Ok(_) => stats.record_dispatched(&entry.op),
        Err(panic) => {
            error!(
                "Handler panicked on {} entry at {} in {}: {}",
                entry.op.as_str(),
                entry.position,
                entry.namespace,
                panic_message(panic.as_ref())
            );
            stats.record_handler_panic();
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "<non-string panic>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Document, OpKind};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(OpKind, Document)>>,
    }

    #[async_trait]
    impl ChangeHandler for Recorder {
        async fn on_insert(&self, inserted: &Document) {
            if inserted.get("explode").is_some() {
                panic!("boom");
            }
            self.seen.lock().push((OpKind::Insert, inserted.clone()));
        }

        async fn on_update(&self, updated: &Document) {
            self.seen.lock().push((OpKind::Update, updated.clone()));
        }

        async fn on_delete(&self, deleted: &Document) {
            self.seen.lock().push((OpKind::Delete, deleted.clone()));
        }
    }

    fn doc(id: i64) -> Document {
        let mut d = Document::new();
        d.insert("_id".into(), json!(id));
        d
    }

    async fn wait_for_commit(rx: &mut watch::Receiver<Timestamp>, target: Timestamp) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while *rx.borrow_and_update() < target {
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("commit not reached");
    }

    #[tokio::test]
    async fn test_routes_and_commits() {
        let recorder = Arc::new(Recorder::default());
        let stats = Arc::new(TailerStats::new("t"));
        let (tx, mut rx) = watch::channel(Timestamp::MIN);
        let dispatcher = Dispatcher::spawn(recorder.clone(), 2, 8, tx, stats.clone());

        dispatcher
            .dispatch(LogEntry::insert(Timestamp::new(1, 0), "a.b", doc(1)))
            .await
            .unwrap();
        dispatcher
            .dispatch(LogEntry::update(Timestamp::new(2, 0), "a.b", doc(1), doc(9)))
            .await
            .unwrap();
        dispatcher
            .dispatch(LogEntry::delete(Timestamp::new(3, 0), "a.b", doc(1)))
            .await
            .unwrap();

        wait_for_commit(&mut rx, Timestamp::new(3, 0)).await;
        dispatcher.shutdown().await;

        // same document, same worker: log order preserved
        let seen = recorder.seen.lock().clone();
        assert_eq!(
            seen,
            vec![
                (OpKind::Insert, doc(1)),
                (OpKind::Update, doc(9)),
                (OpKind::Delete, doc(1)),
            ]
        );
        assert_eq!(stats.snapshot().dispatched(), 3);
    }

    #[tokio::test]
    async fn test_unknown_op_dropped_but_committed() {
        let recorder = Arc::new(Recorder::default());
        let stats = Arc::new(TailerStats::new("t"));
        let (tx, mut rx) = watch::channel(Timestamp::MIN);
        let dispatcher = Dispatcher::spawn(recorder.clone(), 1, 8, tx, stats.clone());

        let noop = LogEntry::new(Timestamp::new(5, 0), OpKind::from_code("n"), "a.b", doc(1));
        dispatcher.dispatch(noop).await.unwrap();

        wait_for_commit(&mut rx, Timestamp::new(5, 0)).await;
        dispatcher.shutdown().await;

        assert!(recorder.seen.lock().is_empty());
        assert_eq!(stats.snapshot().unknown_ops, 1);
    }

    #[tokio::test]
    async fn test_handler_panic_is_isolated() {
        let recorder = Arc::new(Recorder::default());
        let stats = Arc::new(TailerStats::new("t"));
        let (tx, mut rx) = watch::channel(Timestamp::MIN);
        let dispatcher = Dispatcher::spawn(recorder.clone(), 1, 8, tx, stats.clone());

        let mut bad = doc(1);
        bad.insert("explode".into(), json!(true));
        dispatcher
            .dispatch(LogEntry::insert(Timestamp::new(1, 0), "a.b", bad))
            .await
            .unwrap();
        dispatcher
            .dispatch(LogEntry::insert(Timestamp::new(2, 0), "a.b", doc(2)))
            .await
            .unwrap();

        wait_for_commit(&mut rx, Timestamp::new(2, 0)).await;
        dispatcher.shutdown().await;

        assert_eq!(recorder.seen.lock().len(), 1);
        let snap = stats.snapshot();
        assert_eq!(snap.handler_panics, 1);
        assert_eq!(snap.inserts, 1);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queues() {
        let recorder = Arc::new(Recorder::default());
        let stats = Arc::new(TailerStats::new("t"));
        let (tx, rx) = watch::channel(Timestamp::MIN);
        let dispatcher = Dispatcher::spawn(recorder.clone(), 3, 64, tx, stats);

        for i in 1..=50u32 {
            dispatcher
                .dispatch(LogEntry::insert(Timestamp::new(i, 0), "a.b", doc(i as i64)))
                .await
                .unwrap();
        }
        dispatcher.shutdown().await;

        assert_eq!(recorder.seen.lock().len(), 50);
        assert_eq!(*rx.borrow(), Timestamp::new(50, 0));
    }
}
