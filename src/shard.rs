//! Bounded shard accumulation.
//!
//! A [`ShardWriter`] buffers converted records and persists them as a shard
//! each time the buffer reaches `batch_size`. [`ShardWriter::flush`] writes
//! whatever is left at the end of a partition. At most `batch_size` records
//! are ever held in memory by one writer.

use crate::convert::Record;
use crate::io::shards::write_shard;
use crate::partition::ShardIds;
use anyhow::{Context, Result, ensure};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// A persisted shard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ShardHandle {
    pub id: u64,
    pub path: PathBuf,
    pub records: usize,
}

/// Accumulates records and writes them out as fixed-size shards.
pub struct ShardWriter {
    dir: PathBuf,
    batch_size: usize,
    ids: ShardIds,
    buffer: Vec<Record>,
    written: Vec<ShardHandle>,
    persist_time: Duration,
}

impl ShardWriter {
    /// Create a writer persisting into `dir`, which must already exist.
    ///
    /// # Errors
    /// Returns an error if `batch_size` is zero.
    pub fn new(dir: impl Into<PathBuf>, batch_size: usize, ids: ShardIds) -> Result<Self> {
        ensure!(batch_size > 0, "batch size must be positive");
        Ok(Self {
            dir: dir.into(),
            batch_size,
            ids,
            buffer: Vec::with_capacity(batch_size.min(64 * 1024)),
            written: Vec::new(),
            persist_time: Duration::ZERO,
        })
    }

    /// Buffer one record, persisting a shard if the buffer is now full.
    ///
    /// # Errors
    /// Returns an error if the shard cannot be written. The buffered records
    /// are kept so the caller may report them.
    pub fn accept(&mut self, record: Record) -> Result<Option<ShardHandle>> {
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            return self.persist().map(Some);
        }
        Ok(None)
    }

    /// Persist any buffered records as a final, possibly short, shard.
    ///
    /// Returns `None` without taking an id when nothing is buffered.
    ///
    /// # Errors
    /// Returns an error if the shard cannot be written.
    pub fn flush(&mut self) -> Result<Option<ShardHandle>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        self.persist().map(Some)
    }

    fn persist(&mut self) -> Result<ShardHandle> {
        let id = self.ids.next_id();
        let started = Instant::now();
        let path = write_shard(&self.dir, id, &self.buffer)
            .with_context(|| format!("write shard {id} to {}", self.dir.display()))?;
        self.persist_time += started.elapsed();

        let handle = ShardHandle {
            id,
            path,
            records: self.buffer.len(),
        };
        debug!(shard = id, records = handle.records, path = %handle.path.display(), "shard persisted");
        self.buffer.clear();
        self.written.push(handle.clone());
        Ok(handle)
    }

    /// Records currently buffered and not yet persisted.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every shard this writer has persisted, in write order.
    pub fn written(&self) -> &[ShardHandle] {
        &self.written
    }

    /// Total records across persisted shards.
    pub fn records_written(&self) -> u64 {
        self.written.iter().map(|h| h.records as u64).sum()
    }

    /// Wall time spent serializing and syncing shards.
    pub fn persist_time(&self) -> Duration {
        self.persist_time
    }

    /// Consume the writer, returning its shards. Unflushed records are dropped.
    pub fn into_written(self) -> Vec<ShardHandle> {
        self.written
    }
}
