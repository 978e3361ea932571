//! Bulk loading of persisted shards into a document store.
//!
//! A [`BulkSink`] accepts one shard's records per call. [`load_shards`] feeds
//! shards to a sink in parallel, wrapping every call in a timeout and retrying
//! transient failures with backoff. A shard that still fails is recorded and
//! the remaining shards are loaded anyway; its file stays on disk so it can be
//! loaded again later.
//!
//! Built-in sinks:
//! - [`JsonlSink`] (`file://<dir>`) appends each collection to `<dir>/<collection>.jsonl`
//! - [`MemorySink`] (`memory://`) keeps collections in process, with scripted failures

pub mod jsonl;
pub mod memory;
pub mod retry;

pub use jsonl::JsonlSink;
pub use memory::MemorySink;
pub use retry::{PendingCall, RetryConfig, retry_with_backoff, retry_with_timeout, with_timeout};

use crate::io::shards::{list_shards, read_shard};
use anyhow::{Result, bail};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

// ============================================================================
// Error Type
// ============================================================================

/// Failure of one bulk-insert call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError {
    pub kind: SinkErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkErrorKind {
    Network,
    Timeout,
    Unavailable,
    RateLimited,
    /// The store refused the documents; retrying will not help.
    Rejected,
    Other,
}

impl SinkError {
    pub fn new(kind: SinkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether the same call may succeed if repeated.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            SinkErrorKind::Network
                | SinkErrorKind::Timeout
                | SinkErrorKind::Unavailable
                | SinkErrorKind::RateLimited
        )
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for SinkError {}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let kind = match err.kind() {
            ErrorKind::TimedOut => SinkErrorKind::Timeout,
            ErrorKind::Interrupted | ErrorKind::WouldBlock => SinkErrorKind::Unavailable,
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => SinkErrorKind::Network,
            _ => SinkErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

pub type SinkResult<T> = Result<T, SinkError>;

// ============================================================================
// Sink Trait
// ============================================================================

/// Destination accepting batches of JSON-compatible records.
pub trait BulkSink: Send + Sync {
    /// Short identifier used in logs (e.g., `"jsonl"`).
    fn name(&self) -> &str;

    /// Insert `records`, returning how many were stored.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] whose kind tells the loader whether to retry.
    fn insert_many(&self, records: &[Value]) -> SinkResult<usize>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Where and how to bulk-load finished shards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// `file://<dir>` or `memory://`.
    pub uri: String,
    pub collection: String,
    /// Per-call timeout.
    pub timeout_ms: u64,
    pub retry: RetryConfig,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            uri: "memory://".to_string(),
            collection: "records".to_string(),
            timeout_ms: 30_000,
            retry: RetryConfig::default(),
        }
    }
}

impl SinkConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Open the sink named by `config.uri`.
///
/// # Errors
///
/// Returns an error for an unsupported scheme or if the store cannot be opened.
pub fn open_sink(config: &SinkConfig) -> Result<Arc<dyn BulkSink>> {
    let Some((scheme, rest)) = config.uri.split_once("://") else {
        bail!("invalid sink URI (expected <scheme>://...): {}", config.uri);
    };
    match scheme {
        "file" => Ok(Arc::new(JsonlSink::open(rest, &config.collection)?)),
        "memory" => Ok(Arc::new(MemorySink::new(config.collection.clone()))),
        other => bail!("unsupported sink scheme {other:?} in {}", config.uri),
    }
}

// ============================================================================
// Shard Loading
// ============================================================================

/// A shard that could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedLoad {
    pub shard: u64,
    pub error: String,
}

/// Outcome of loading a set of shards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub loaded_shards: usize,
    pub loaded_records: u64,
    /// Sorted by shard id.
    pub failed: Vec<FailedLoad>,
}

impl LoadStats {
    pub fn failed_ids(&self) -> Vec<u64> {
        self.failed.iter().map(|f| f.shard).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Load each `(id, path)` shard into `sink`, in parallel on the current rayon pool.
///
/// Failures are collected per shard; they never stop the other loads.
pub fn load_shards(
    sink: &Arc<dyn BulkSink>,
    shards: &[(u64, PathBuf)],
    config: &SinkConfig,
) -> LoadStats {
    let outcomes: Vec<(u64, std::result::Result<usize, String>)> = shards
        .par_iter()
        .map(|(id, path)| (*id, load_one(sink, *id, path, config)))
        .collect();

    let mut stats = LoadStats::default();
    for (shard, outcome) in outcomes {
        match outcome {
            Ok(n) => {
                stats.loaded_shards += 1;
                stats.loaded_records += n as u64;
            }
            Err(error) => stats.failed.push(FailedLoad { shard, error }),
        }
    }
    stats.failed.sort_by_key(|f| f.shard);
    stats
}

/// Load the shards found in `dir`, or only the listed ids when `only` is set.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed or a requested id has no shard file.
pub fn load_directory(
    sink: &Arc<dyn BulkSink>,
    dir: &Path,
    only: Option<&[u64]>,
    config: &SinkConfig,
) -> Result<LoadStats> {
    let mut shards = list_shards(dir)?;
    if let Some(ids) = only {
        if let Some(missing) = ids.iter().find(|id| !shards.iter().any(|(s, _)| s == *id)) {
            bail!("no shard {missing} in {}", dir.display());
        }
        shards.retain(|(id, _)| ids.contains(id));
    }
    Ok(load_shards(sink, &shards, config))
}

fn load_one(
    sink: &Arc<dyn BulkSink>,
    id: u64,
    path: &Path,
    config: &SinkConfig,
) -> std::result::Result<usize, String> {
    let records = match read_shard(path) {
        Ok(r) => Arc::new(r),
        Err(err) => {
            error!(shard = id, error = %format!("{err:#}"), "cannot read shard for loading");
            return Err(format!("{err:#}"));
        }
    };

    let timeout = config.timeout();
    let result = retry_with_timeout(&config.retry, timeout, || {
        let sink = Arc::clone(sink);
        let records = Arc::clone(&records);
        move || sink.insert_many(&records)
    });

    match result {
        Ok(n) => {
            debug!(shard = id, records = n, sink = sink.name(), "shard loaded");
            Ok(n)
        }
        Err(err) => {
            error!(shard = id, sink = sink.name(), error = %err, "shard failed to load");
            Err(err.to_string())
        }
    }
}
