//! The tailing loop
//!
//! ```text
//!  Connecting ──open──► Streaming ◄──────────────┐
//!                         │  ▲ entry / timeout   │ reopened
//!                         └──┘                   │
//!                         │ error / exhausted    │
//!                         ▼                      │
//!                     Reconnecting ──────────────┘
//!                         │ fatal / retries exhausted
//!                         ▼
//!                     Terminated
//! ```
//!
//! The initial cursor waits for data without bound; cursors reopened after a
//! failure use a bounded await window so repeated failures surface quickly.
//! Reconnects resume after the last *fetched* position: entries already
//! handed to the dispatcher are not fetched twice, while the durable
//! checkpoint trails behind until their handlers complete.

use crate::common::{
    build_selectors, AwaitMode, CheckpointManager, CursorEvent, Dispatcher, EntrySelector,
    LogCursor, Result, RetryConfig, SharedCheckpointStore, SharedHandler, SharedLogSource,
    TailError, TailerCheckpoint, TailerConfig, TailerStats, Timestamp,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Tailing loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailerState {
    Connecting,
    Streaming,
    Reconnecting,
    Terminated,
}

impl fmt::Display for TailerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Reconnecting => "reconnecting",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Tails one namespace filter of a log source into a handler.
///
/// # Example
///
/// ```rust,ignore
/// use optail::{MemoryCheckpointStore, Tailer, TailerConfig};
/// use tokio_util::sync::CancellationToken;
///
/// let config = TailerConfig::builder()
///     .filter_pattern("orders.*")
///     .label("etl1")
///     .build()?;
///
/// let store = Arc::new(MemoryCheckpointStore::new());
/// let tailer = Tailer::new(config, source, store, handler).await?;
/// let cancel = CancellationToken::new();
/// let final_checkpoint = tailer.run(cancel.clone()).await?;
/// ```
pub struct Tailer {
    config: TailerConfig,
    source: SharedLogSource,
    checkpoints: CheckpointManager,
    handler: SharedHandler,
    checkpoint: TailerCheckpoint,
    stats: Arc<TailerStats>,
    state: watch::Sender<TailerState>,
}

impl Tailer {
    /// Validate the configuration and load (or create) the checkpoint.
    ///
    /// Fails if the filter does not compile or the store holds more than one
    /// checkpoint for the (filter, label) pair.
    pub async fn new(
        config: TailerConfig,
        source: SharedLogSource,
        store: SharedCheckpointStore,
        handler: SharedHandler,
    ) -> Result<Self> {
        config.validate()?;

        let checkpoints = CheckpointManager::new(store);
        let checkpoint = checkpoints
            .initialize(&config.filter_pattern, &config.label)
            .await?;
        let stats = Arc::new(TailerStats::new(config.label.clone()));
        let (state, _) = watch::channel(TailerState::Connecting);

        Ok(Self {
            config,
            source,
            checkpoints,
            handler,
            checkpoint,
            stats,
            state,
        })
    }

    /// Checkpoint the tailer resumes from.
    pub fn checkpoint(&self) -> &TailerCheckpoint {
        &self.checkpoint
    }

    pub fn config(&self) -> &TailerConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<TailerStats> {
        self.stats.clone()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<TailerState> {
        self.state.subscribe()
    }

    /// Tail until cancelled or a fatal error occurs.
    ///
    /// On exit the dispatch queues are drained and the final committed
    /// position is persisted; the persisted checkpoint is returned.
    pub async fn run(self, cancel: CancellationToken) -> Result<TailerCheckpoint> {
        let (_, selector) = build_selectors(&self.checkpoint)?;

        // Cancelled by the caller, or by the checkpoint writer on a fatal error
        let run_cancel = cancel.child_token();

        let (commit_tx, commit_rx) = watch::channel(self.checkpoint.position);
        let writer = tokio::spawn(write_checkpoints(
            self.checkpoints.clone(),
            self.checkpoint.clone(),
            commit_rx,
            self.config.checkpoint_interval,
            self.config.retry.clone(),
            self.stats.clone(),
            run_cancel.clone(),
        ));
        let dispatcher = Dispatcher::spawn(
            self.handler.clone(),
            self.config.workers,
            self.config.queue_capacity,
            commit_tx,
            self.stats.clone(),
        );

        let outcome = self.stream(&dispatcher, selector, &run_cancel).await;

        debug!("Draining {} in-flight entries", dispatcher.in_flight());
        dispatcher.shutdown().await;
        let flushed = writer
            .await
            .map_err(|e| TailError::InvalidState(format!("Checkpoint writer failed: {}", e)))?;
        self.set_state(TailerState::Terminated);

        match (outcome, flushed) {
            (Err(e), flushed) => {
                if let Err(flush_err) = flushed {
                    self.stats.record_error(&flush_err);
                    error!("Checkpoint flush also failed: {}", flush_err);
                }
                self.stats.record_error(&e);
                error!("Tailer [{}] terminated: {}", self.config.label, e);
                Err(e)
            }
            (Ok(()), Err(e)) => {
                self.stats.record_error(&e);
                error!("Tailer [{}] terminated: {}", self.config.label, e);
                Err(e)
            }
            (Ok(()), Ok(checkpoint)) => {
                info!(
                    "Tailer [{}] stopped at {}",
                    self.config.label, checkpoint.position
                );
                Ok(checkpoint)
            }
        }
    }

    async fn stream(
        &self,
        dispatcher: &Dispatcher,
        selector: EntrySelector,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut resume = selector.after();

        self.set_state(TailerState::Connecting);
        info!(
            "Tailing {} for [{}] label [{}] after {}",
            self.source.describe(),
            selector.pattern(),
            self.config.label,
            resume
        );

        let mut cursor = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            opened = self.source.open(&selector, AwaitMode::Unbounded) => match opened {
                Ok(cursor) => cursor,
                Err(e) => {
                    error!("Cannot open {}: {}", self.source.describe(), e);
                    return Err(e);
                }
            },
        };
        self.set_state(TailerState::Streaming);

        // Consecutive cursor failures without a healthy fetch in between
        let mut failures: u32 = 0;

        loop {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                fetched = cursor.next() => fetched,
            };

            let cause = match fetched {
                Ok(CursorEvent::Entry(entry)) => {
                    failures = 0;
                    resume = resume.max(entry.position);
                    self.stats.record_fetched();
                    trace!("Fetched {} {} at {}", entry.op, entry.namespace, entry.position);

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(()),
                        queued = dispatcher.dispatch(entry) => queued?,
                    }
                    continue;
                }
                Ok(CursorEvent::Timeout) => {
                    failures = 0;
                    trace!("No new entries after {}", resume);
                    continue;
                }
                Ok(CursorEvent::Exhausted) => {
                    warn!("Cursor exhausted after {}, reconnecting", resume);
                    "cursor exhausted".to_string()
                }
                Err(e) if self.can_retry(&e) => {
                    self.stats.record_error(&e);
                    warn!("Cursor failed after {}: {}, reconnecting", resume, e);
                    e.to_string()
                }
                Err(e) => {
                    error!("Cursor failed after {}: {}", resume, e);
                    return Err(e);
                }
            };

            failures += 1;
            match self
                .reconnect(&selector.resume_after(resume), &mut failures, cause, cancel)
                .await?
            {
                Some(reopened) => cursor = reopened,
                None => return Ok(()),
            }
        }
    }

    /// Reopen a cursor with backoff. `Ok(None)` means cancelled.
    async fn reconnect(
        &self,
        selector: &EntrySelector,
        failures: &mut u32,
        mut last_error: String,
        cancel: &CancellationToken,
    ) -> Result<Option<Box<dyn LogCursor>>> {
        self.set_state(TailerState::Reconnecting);
        self.stats.record_reconnect();
        let retry = &self.config.retry;
        let await_mode = AwaitMode::Bounded(self.config.reconnect_await);

        loop {
            let attempt = failures.saturating_sub(1);
            if !retry.should_retry(attempt) {
                return Err(TailError::RetriesExhausted {
                    attempts: attempt,
                    last_error,
                });
            }

            if attempt > 0 {
                let delay = retry.delay_for_attempt(attempt - 1);
                debug!("Reconnect attempt {} in {:?}", attempt + 1, delay);
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let opened = tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                opened = self.source.open(selector, await_mode) => opened,
            };

            match opened {
                Ok(cursor) => {
                    info!(
                        "Reopened cursor on {} after {}",
                        self.source.describe(),
                        selector.after()
                    );
                    self.set_state(TailerState::Streaming);
                    return Ok(Some(cursor));
                }
                Err(e) if self.can_retry(&e) => {
                    self.stats.record_error(&e);
                    warn!("Reconnect attempt {} failed: {}", attempt + 1, e);
                    last_error = e.to_string();
                    *failures += 1;
                }
                Err(e) => {
                    error!("Reconnect failed: {}", e);
                    return Err(e);
                }
            }
        }
    }

    /// Retriable errors whose kind the retry policy covers.
    fn can_retry(&self, error: &TailError) -> bool {
        error
            .retriable_error_type()
            .is_some_and(|kind| self.config.retry.is_retriable(&kind))
    }

    fn set_state(&self, state: TailerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Tailer [{}] {} -> {}", self.config.label, previous, state);
        }
    }
}

/// Persist committed positions, coalescing bursts to one write per interval.
///
/// Store errors are retried with backoff; a vanished checkpoint record is
/// fatal and cancels the run.
async fn write_checkpoints(
    manager: CheckpointManager,
    mut checkpoint: TailerCheckpoint,
    mut commits: watch::Receiver<Timestamp>,
    interval: Duration,
    retry: RetryConfig,
    stats: Arc<TailerStats>,
    fatal: CancellationToken,
) -> Result<TailerCheckpoint> {
    let mut failures: u32 = 0;

    loop {
        let closed = if failures > 0 {
            commits.has_changed().is_err()
        } else {
            commits.changed().await.is_err()
        };
        let position = *commits.borrow_and_update();

        match manager.advance(&mut checkpoint, position).await {
            Ok(written) => {
                if written {
                    stats.record_checkpoint_write();
                }
                failures = 0;
            }
            Err(e @ TailError::Checkpoint(_)) => {
                stats.record_checkpoint_error();
                error!("Cannot persist checkpoint {}: {}", position, e);
                fatal.cancel();
                return Err(e);
            }
            Err(e) => {
                stats.record_checkpoint_error();
                if closed {
                    // reported by the caller as the run's outcome
                    return Err(e);
                }
                stats.record_error(&e);
                warn!("Failed to persist checkpoint {}: {}, retrying", position, e);
                let delay = retry.delay_for_attempt(failures).max(interval);
                failures += 1;
                tokio::time::sleep(delay).await;
                continue;
            }
        }

        if closed {
            return Ok(checkpoint);
        }
        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }
}
