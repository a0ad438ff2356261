//! # optail - Resumable replication log tailer
//!
//! Follows an append-only replication log (an oplog), selects entries whose
//! namespace matches a regular expression, and delivers inserts, updates and
//! deletes to a [`ChangeHandler`]. Progress is checkpointed per
//! (filter pattern, label) pair so a restarted tailer resumes where the
//! previous one stopped.
//!
//! ## Features
//!
//! - `jsonl` - Tail newline-delimited JSON oplog exports ([`sources::JsonlLogSource`])
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ LogSource   │────►│ Tailer loop  │────►│ Dispatcher   │──► ChangeHandler
//! │ (cursor)    │◄────│ (reconnects) │     │ (workers)    │
//! └─────────────┘     └──────┬───────┘     └──────┬───────┘
//!                            │ initialize         │ committed
//!                            ▼                    ▼
//!                     ┌──────────────────────────────────┐
//!                     │         CheckpointStore          │
//!                     └──────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn example() -> anyhow::Result<()> {
//! use async_trait::async_trait;
//! use optail::sources::MemoryLogSource;
//! use optail::{ChangeHandler, Document, MemoryCheckpointStore, Tailer, TailerConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Print;
//!
//! #[async_trait]
//! impl ChangeHandler for Print {
//!     async fn on_insert(&self, inserted: &Document) { println!("+ {:?}", inserted); }
//!     async fn on_update(&self, updated: &Document) { println!("~ {:?}", updated); }
//!     async fn on_delete(&self, deleted: &Document) { println!("- {:?}", deleted); }
//! }
//!
//! let config = TailerConfig::builder()
//!     .filter_pattern("orders.*")
//!     .label("etl1")
//!     .build()?;
//!
//! let tailer = Tailer::new(
//!     config,
//!     Arc::new(MemoryLogSource::new()),
//!     Arc::new(MemoryCheckpointStore::new()),
//!     Arc::new(Print),
//! )
//! .await?;
//!
//! let checkpoint = tailer.run(CancellationToken::new()).await?;
//! println!("stopped at {}", checkpoint.position);
//! # Ok(())
//! # }
//! ```

pub mod common;
pub mod sources;
mod tailer;

pub use common::{
    // Errors
    ErrorCategory,
    Result,
    TailError,
    // Log records
    Document,
    LogEntry,
    OpKind,
    Timestamp,
    // Checkpoints
    CheckpointStore,
    FileCheckpointStore,
    MemoryCheckpointStore,
    TailerCheckpoint,
    // Driver seam
    AwaitMode,
    CursorEvent,
    LogCursor,
    LogSource,
    // Handlers
    ChangeHandler,
    // Configuration
    RetryConfig,
    TailerConfig,
    TailerConfigBuilder,
    // Observability
    TailerStats,
    TailerStatsSnapshot,
};
pub use tailer::{Tailer, TailerState};
