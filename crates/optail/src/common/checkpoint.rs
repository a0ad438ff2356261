//! # Tailer Checkpointing
//!
//! Persistent position tracking for resumable tailing.
//!
//! Each tailer owns exactly one [`TailerCheckpoint`] record, keyed by its
//! (filter pattern, label) pair. The record is created on first start seeded
//! with the current time, reused on every restart, and only ever moves
//! forward.
//!
//! ## Backends
//!
//! | Store | Use Case |
//! |-------|----------|
//! | [`MemoryCheckpointStore`] | Testing, embedded tailers |
//! | [`FileCheckpointStore`] | Single-node deployments |
//!
//! ## Usage
//!
//! ```ignore
//! use optail::common::{CheckpointManager, FileCheckpointStore};
//!
//! let store = FileCheckpointStore::open("/var/lib/optail/checkpoints.json").await?;
//! let manager = CheckpointManager::new(Arc::new(store));
//!
//! let mut checkpoint = manager.initialize("orders.*", "etl1").await?;
//! manager.advance(&mut checkpoint, entry.position).await?;
//! ```

use crate::common::{CheckpointSelector, Result, TailError, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Last acknowledged position of one tailer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailerCheckpoint {
    /// Namespace filter the tailer was started with
    pub filter_pattern: String,
    /// Lineage label distinguishing tailers that share a filter
    pub label: String,
    /// Entries at or before this position have been processed
    pub position: Timestamp,
}

impl TailerCheckpoint {
    pub fn new(
        filter_pattern: impl Into<String>,
        label: impl Into<String>,
        position: Timestamp,
    ) -> Self {
        Self {
            filter_pattern: filter_pattern.into(),
            label: label.into(),
            position,
        }
    }
}

/// Storage backend for checkpoint records.
///
/// Mirrors a small document collection: find by selector, insert, and update
/// by selector.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// All records matching the selector.
    async fn find(&self, selector: &CheckpointSelector) -> Result<Vec<TailerCheckpoint>>;

    /// Insert a new record.
    async fn insert(&self, checkpoint: TailerCheckpoint) -> Result<()>;

    /// Move the position of matching records forward to `position`.
    ///
    /// Records already at or past `position` are left untouched. Returns the
    /// number of matched records.
    async fn update(&self, selector: &CheckpointSelector, position: Timestamp) -> Result<usize>;
}

/// Shared checkpoint backend.
pub type SharedCheckpointStore = Arc<dyn CheckpointStore>;

/// Checkpoint lifecycle on top of a [`CheckpointStore`].
#[derive(Clone)]
pub struct CheckpointManager {
    store: SharedCheckpointStore,
}

impl CheckpointManager {
    pub fn new(store: SharedCheckpointStore) -> Self {
        Self { store }
    }

    /// Load the checkpoint for (filter, label), creating it at the current
    /// time when absent.
    ///
    /// Fails with [`TailError::MultipleCheckpoints`] when the store holds more
    /// than one matching record; picking one would risk resuming from the
    /// wrong position.
    pub async fn initialize(&self, filter_pattern: &str, label: &str) -> Result<TailerCheckpoint> {
        let selector = CheckpointSelector::new(filter_pattern, label);
        let mut found = self.store.find(&selector).await?;

        match found.len() {
            0 => {
                let checkpoint = TailerCheckpoint::new(filter_pattern, label, Timestamp::now());
                self.store.insert(checkpoint.clone()).await?;
                info!(
                    "Created checkpoint for filter [{}] label [{}] at {}",
                    filter_pattern, label, checkpoint.position
                );
                Ok(checkpoint)
            }
            1 => {
                let checkpoint = found.remove(0);
                info!(
                    "Resuming filter [{}] label [{}] from {}",
                    filter_pattern, label, checkpoint.position
                );
                Ok(checkpoint)
            }
            count => Err(TailError::MultipleCheckpoints {
                filter_pattern: filter_pattern.to_string(),
                label: label.to_string(),
                count,
            }),
        }
    }

    /// Persist `position` and move `checkpoint` to it.
    ///
    /// Positions at or before the current one are ignored so concurrent
    /// completions can never move the checkpoint backward. Returns whether a
    /// write happened.
    pub async fn advance(
        &self,
        checkpoint: &mut TailerCheckpoint,
        position: Timestamp,
    ) -> Result<bool> {
        if position <= checkpoint.position {
            return Ok(false);
        }

        let selector = CheckpointSelector::for_checkpoint(checkpoint);
        let matched = self.store.update(&selector, position).await?;
        if matched == 0 {
            return Err(TailError::checkpoint(format!(
                "Checkpoint record for filter [{}] label [{}] disappeared",
                checkpoint.filter_pattern, checkpoint.label
            )));
        }

        debug!("Advanced checkpoint [{}] to {}", checkpoint.label, position);
        checkpoint.position = position;
        Ok(true)
    }
}

fn apply_update(
    records: &mut [TailerCheckpoint],
    selector: &CheckpointSelector,
    position: Timestamp,
) -> usize {
    let mut matched = 0;
    for record in records.iter_mut().filter(|r| selector.matches(r)) {
        matched += 1;
        if position > record.position {
            record.position = position;
        }
    }
    matched
}

/// In-memory checkpoint store (for testing or embedded use).
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    records: RwLock<Vec<TailerCheckpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with records. Duplicates are kept as given.
    pub fn with_records(records: Vec<TailerCheckpoint>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn records(&self) -> Vec<TailerCheckpoint> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn find(&self, selector: &CheckpointSelector) -> Result<Vec<TailerCheckpoint>> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| selector.matches(r)).cloned().collect())
    }

    async fn insert(&self, checkpoint: TailerCheckpoint) -> Result<()> {
        self.records.write().await.push(checkpoint);
        Ok(())
    }

    async fn update(&self, selector: &CheckpointSelector, position: Timestamp) -> Result<usize> {
        let mut records = self.records.write().await;
        Ok(apply_update(&mut records, selector, position))
    }
}

/// File-backed checkpoint store.
///
/// The whole record collection lives in one JSON file:
/// ```text
/// [
///   { "filter_pattern": "orders.*", "label": "etl1", "position": { "t": 1700000000, "i": 3 } }
/// ]
/// ```
///
/// Every mutation rewrites the file atomically (temp file, optional fsync,
/// rename) while holding the write lock, so writes are serialized.
pub struct FileCheckpointStore {
    path: PathBuf,
    records: RwLock<Vec<TailerCheckpoint>>,
    fsync: bool,
}

impl FileCheckpointStore {
    /// Open the store, loading existing records if the file exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_options(path, true).await
    }

    /// Open the store with custom options.
    pub async fn with_options(path: impl AsRef<Path>, fsync: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let records = match fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => Vec::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                TailError::serialization(format!(
                    "Corrupt checkpoint file {}: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(TailError::Io(e)),
        };

        if !records.is_empty() {
            info!("Loaded {} checkpoints from {}", records.len(), path.display());
        }

        Ok(Self {
            path,
            records: RwLock::new(records),
            fsync,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &[TailerCheckpoint]) -> Result<()> {
        let json = serde_json::to_string_pretty(records)?;
        let temp_path = self.path.with_extension("tmp");

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .await?;
        file.write_all(json.as_bytes()).await?;
        if self.fsync {
            file.sync_all().await?;
        }
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn find(&self, selector: &CheckpointSelector) -> Result<Vec<TailerCheckpoint>> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| selector.matches(r)).cloned().collect())
    }

    async fn insert(&self, checkpoint: TailerCheckpoint) -> Result<()> {
        let mut records = self.records.write().await;
        let mut updated = records.clone();
        updated.push(checkpoint);
        self.persist(&updated).await?;
        *records = updated;
        Ok(())
    }

    async fn update(&self, selector: &CheckpointSelector, position: Timestamp) -> Result<usize> {
        let mut records = self.records.write().await;
        let mut updated = records.clone();
        let matched = apply_update(&mut updated, selector, position);
        if updated != *records {
            self.persist(&updated).await?;
            *records = updated;
        }
        Ok(matched)
    }
}
