//! Local document store: one append-only JSONL file per collection.

use crate::sink::{BulkSink, SinkResult};
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs::{OpenOptions, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Appends inserted documents to `<dir>/<collection>.jsonl`, one per line.
///
/// Calls are serialized so concurrent loads never interleave lines.
pub struct JsonlSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlSink {
    /// Open (creating if needed) the store directory for `collection`.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>, collection: &str) -> Result<Self> {
        let dir = dir.as_ref();
        create_dir_all(dir).with_context(|| format!("mkdir -p {}", dir.display()))?;
        Ok(Self {
            path: dir.join(format!("{collection}.jsonl")),
            lock: Mutex::new(()),
        })
    }

    /// Path of the collection file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BulkSink for JsonlSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn insert_many(&self, records: &[Value]) -> SinkResult<usize> {
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut w = BufWriter::new(f);
        for record in records {
            serde_json::to_writer(&mut w, record).map_err(std::io::Error::from)?;
            w.write_all(b"\n")?;
        }
        w.flush()?;
        Ok(records.len())
    }
}
