//! # Common Tailer Types and Traits
//!
//! Source-agnostic building blocks of the tailer:
//!
//! - [`LogEntry`] / [`Timestamp`] - Replication log records and positions
//! - [`CheckpointStore`] - Durable (filter, label) -> position records
//! - [`CheckpointSelector`] / [`EntrySelector`] - Lookup and tail predicates
//! - [`LogSource`] / [`LogCursor`] - Driver seam for tailable cursors
//! - [`ChangeHandler`] - Insert/update/delete callbacks
//! - [`Dispatcher`] - Partitioned worker pool with in-order commits
//! - [`RetryConfig`] - Reconnect backoff
//! - [`TailerStats`] - Counters mirrored to the `metrics` facade
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  selector  ┌───────────┐  entries  ┌────────────┐
//! │ Checkpoint ├───────────►│ LogSource ├──────────►│ Dispatcher │
//! │   Store    │            └───────────┘           └─────┬──────┘
//! └─────▲──────┘                                          │ handler
//!       │             committed position                  ▼
//!       └──────────────────────────────────────── ChangeHandler
//! ```

mod checkpoint;
mod commit;
mod config;
mod dispatcher;
mod error;
mod event;
mod handler;
mod partitioner;
mod resilience;
mod selector;
mod source;
mod stats;

pub use checkpoint::*;
pub use commit::*;
pub use config::*;
pub use dispatcher::*;
pub use error::*;
pub use event::*;
pub use handler::*;
pub use partitioner::*;
pub use resilience::*;
pub use selector::*;
pub use source::*;
pub use stats::*;
