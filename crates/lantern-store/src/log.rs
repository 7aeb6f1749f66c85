//! Append-only JSONL persistence
//!
//! One serde_json line per entry, written before the in-memory state is
//! touched. Replay on startup tolerates corrupt lines (a station that died
//! mid-write should not refuse to boot), and compaction rewrites the file
//! from current state via a temp file and atomic rename.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// An append-only log of JSON lines
pub struct JsonlLog<T> {
    path: PathBuf,
    writer: Arc<RwLock<Option<BufWriter<File>>>>,
    /// Whether to flush after every append (durability vs throughput)
    sync_writes: bool,
    _entry: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for JsonlLog<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlLog").field("path", &self.path).finish()
    }
}

impl<T: Serialize + DeserializeOwned> JsonlLog<T> {
    /// Open (creating if needed) the log at `path`
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::with_options(path, true).await
    }

    /// Open with explicit sync behavior
    pub async fn with_options(path: impl AsRef<Path>, sync_writes: bool) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let log = Self {
            path,
            writer: Arc::new(RwLock::new(None)),
            sync_writes,
            _entry: PhantomData,
        };
        log.open_writer().await?;
        Ok(log)
    }

    /// The file this log writes to
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open_writer(&self) -> StoreResult<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        *self.writer.write().await = Some(BufWriter::new(file));
        debug!(path = ?self.path, "Opened log file for writing");
        Ok(())
    }

    /// Replay all entries, skipping corrupt lines
    pub async fn load(&self) -> StoreResult<Vec<T>> {
        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "No existing log file, starting fresh");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut entries = Vec::new();
        let mut error_count = 0usize;

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(&line) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    error_count += 1;
                    warn!(error = %err, "Failed to parse log entry, skipping");
                }
            }
        }

        info!(
            path = ?self.path,
            loaded = entries.len(),
            errors = error_count,
            "Finished loading log"
        );
        Ok(entries)
    }

    /// Append one entry
    pub async fn append(&self, entry: &T) -> StoreResult<()> {
        let line = serde_json::to_string(entry)?;

        let mut guard = self.writer.write().await;
        let writer = guard.as_mut().ok_or(StoreError::LogNotOpen)?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        if self.sync_writes {
            writer.flush().await?;
        }
        Ok(())
    }

    /// Flush any buffered writes
    pub async fn flush(&self) -> StoreResult<()> {
        let mut guard = self.writer.write().await;
        if let Some(writer) = guard.as_mut() {
            writer.flush().await?;
        }
        Ok(())
    }

    /// Rewrite the file to contain exactly `entries`
    pub async fn compact(&self, entries: &[T]) -> StoreResult<()> {
        let temp_path = self.path.with_extension("jsonl.tmp");

        info!(path = ?self.path, entries = entries.len(), "Compacting log");

        {
            let file = File::create(&temp_path).await?;
            let mut writer = BufWriter::new(file);
            for entry in entries {
                let line = serde_json::to_string(entry)?;
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
            writer.flush().await?;
        }

        // Close the current writer before swapping the file underneath it
        *self.writer.write().await = None;
        tokio::fs::rename(&temp_path, &self.path).await?;
        self.open_writer().await?;

        Ok(())
    }
}
