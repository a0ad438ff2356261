//! Newline-delimited JSON log source
//!
//! Tails a file holding one [`LogEntry`] per line, as produced by an oplog
//! export (`{"ts":{"t":..,"i":..},"op":"i","ns":"db.coll","o":{..}}`).
//! The file is read in natural order; new lines appended by a writer are
//! picked up by polling.
//!
//! Malformed lines, including ones that are not valid UTF-8, are logged
//! and skipped. A file that shrinks under an
//! open cursor (truncated or rotated) exhausts the cursor so the tailer
//! reopens it from the last fetched position.

use crate::common::{
    AwaitMode, CursorEvent, EntrySelector, LogCursor, LogEntry, LogSource, Result, TailError,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default interval between polls for appended lines.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Log source over a newline-delimited JSON file.
#[derive(Debug, Clone)]
pub struct JsonlLogSource {
    path: PathBuf,
    poll_interval: Duration,
}

impl JsonlLogSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LogSource for JsonlLogSource {
    fn describe(&self) -> String {
        format!("jsonl:{}", self.path.display())
    }

    async fn open(
        &self,
        selector: &EntrySelector,
        await_mode: AwaitMode,
    ) -> Result<Box<dyn LogCursor>> {
        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TailError::source(format!(
                    "Log file {} does not exist",
                    self.path.display()
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(TailError::permission_denied(format!(
                    "Cannot read {}: {}",
                    self.path.display(),
                    e
                )))
            }
            Err(e) => return Err(e.into()),
        };

        debug!("Opened {} after {}", self.path.display(), selector.after());
        Ok(Box::new(JsonlCursor {
            path: self.path.clone(),
            reader: BufReader::new(file),
            selector: selector.clone(),
            await_mode,
            poll_interval: self.poll_interval,
            offset: 0,
            line_no: 0,
            partial: Vec::new(),
        }))
    }
}

struct JsonlCursor {
    path: PathBuf,
    reader: BufReader<File>,
    selector: EntrySelector,
    await_mode: AwaitMode,
    poll_interval: Duration,
    /// Bytes consumed, including a buffered partial line
    offset: u64,
    line_no: u64,
    partial: Vec<u8>,
}

impl JsonlCursor {
    /// Whether the file shrank below what was already read.
    async fn truncated(&self) -> Result<bool> {
        match fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.len() < self.offset),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    fn parse(&self, line: &[u8]) -> Option<LogEntry> {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line.trim(),
            Err(e) => {
                warn!(
                    "Skipping undecodable entry at {}:{}: {}",
                    self.path.display(),
                    self.line_no,
                    e
                );
                return None;
            }
        };
        if line.is_empty() {
            return None;
        }

        match serde_json::from_str::<LogEntry>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(
                    "Skipping malformed entry at {}:{}: {}",
                    self.path.display(),
                    self.line_no,
                    e
                );
                None
            }
        }
    }
}

#[async_trait]
impl LogCursor for JsonlCursor {
    async fn next(&mut self) -> Result<CursorEvent> {
        let deadline = match self.await_mode {
            AwaitMode::Unbounded => None,
            AwaitMode::Bounded(window) => Some(Instant::now() + window),
        };

        loop {
            let read = self.reader.read_until(b'\n', &mut self.partial).await?;

            if read == 0 {
                if self.truncated().await? {
                    warn!("{} was truncated, cursor exhausted", self.path.display());
                    return Ok(CursorEvent::Exhausted);
                }

                let pause = match deadline {
                    None => self.poll_interval,
                    Some(deadline) => {
                        let now = Instant::now();
                        if now >= deadline {
                            return Ok(CursorEvent::Timeout);
                        }
                        self.poll_interval.min(deadline - now)
                    }
                };
                tokio::time::sleep(pause).await;
                continue;
            }

            self.offset += read as u64;
            if self.partial.last() != Some(&b'\n') {
                // writer is mid-line; keep the fragment until the rest lands
                continue;
            }

            let line = std::mem::take(&mut self.partial);
            self.line_no += 1;

            if let Some(entry) = self.parse(&line) {
                if self.selector.matches(&entry) {
                    return Ok(CursorEvent::Entry(entry));
                }
            }
        }
    }
}
