//! Run configuration.

use crate::sink::SinkConfig;
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Default records per shard.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// How records are distributed across workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStrategy {
    /// One extraction pass feeds a bounded queue drained by every worker.
    #[default]
    Shared,
    /// Every worker scans the whole input and builds only the records it owns.
    Modulo,
}

/// Everything a run needs to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Input XML document, optionally compressed.
    pub input: PathBuf,
    /// Element name marking a record boundary.
    pub record_tag: String,
    /// Records per shard.
    pub batch_size: usize,
    /// Parallelism degree.
    pub num_workers: usize,
    /// Shard directory, created if absent.
    pub output_directory: PathBuf,
    pub strategy: ScanStrategy,
    /// Capacity of the shared-scan queue, in records. Defaults to `4 × num_workers`.
    pub queue_capacity: Option<usize>,
    /// Bulk-load finished shards here when set.
    pub sink: Option<SinkConfig>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            record_tag: String::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            num_workers: num_cpus::get().max(1),
            output_directory: PathBuf::from("json_output"),
            strategy: ScanStrategy::default(),
            queue_capacity: None,
            sink: None,
        }
    }
}

impl IngestConfig {
    /// Configuration for `input` split on `record_tag`, with defaults elsewhere.
    pub fn new(input: impl Into<PathBuf>, record_tag: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            record_tag: record_tag.into(),
            ..Self::default()
        }
    }

    /// Load a JSON configuration file. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse config {}", path.display()))
    }

    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.num_workers = workers;
        self
    }

    #[must_use]
    pub fn with_output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_directory = dir.into();
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: ScanStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: SinkConfig) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Effective shared-scan queue capacity.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
            .unwrap_or_else(|| self.num_workers.saturating_mul(4))
            .max(1)
    }

    /// Reject configurations a run cannot honor.
    ///
    /// # Errors
    /// Returns an error naming the first invalid option.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.input.as_os_str().is_empty(), "input path is required");
        ensure!(!self.record_tag.trim().is_empty(), "record_tag must not be empty");
        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(self.num_workers > 0, "num_workers must be positive");
        ensure!(
            self.queue_capacity != Some(0),
            "queue_capacity must be positive"
        );
        if let Some(sink) = &self.sink {
            ensure!(!sink.uri.is_empty(), "sink uri must not be empty");
            ensure!(!sink.collection.is_empty(), "sink collection must not be empty");
            ensure!(sink.retry.max_attempts > 0, "sink retry.max_attempts must be positive");
            ensure!(sink.timeout_ms > 0, "sink timeout_ms must be positive");
        }
        Ok(())
    }
}
