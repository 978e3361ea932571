//! CLI argument definitions.

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use ironshard::{IngestConfig, ScanStrategy, SinkConfig};
use std::path::PathBuf;

/// Split a large XML document into fixed-size JSON shards.
///
/// Every element named by `--record-tag` becomes one JSON record. Records are
/// written in batches to `<output-dir>/output_<id>.json` by a pool of workers,
/// and can optionally be bulk-loaded into a document store.
///
/// ## Examples
///
/// Shard a catalog into 500-record files:
///   ironshard run -i catalog.xml -t item -b 500 -o json_output
///
/// Shard and load into a local JSONL store:
///   ironshard run -i catalog.xml.gz -t item --sink file://store --collection items
///
/// Retry loading two shards that failed earlier:
///   ironshard load -d json_output --shard 3,7 --sink file://store
#[derive(Parser, Debug)]
#[command(name = "ironshard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract records and write shards
    Run(RunArgs),
    /// Bulk-load shards that already exist on disk
    Load(LoadArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Base configuration file (JSON). Flags given here override its values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Input XML document, optionally gzip/zstd/bzip2/xz compressed
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Directory for output_<id>.json shards [default: json_output]
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Element name marking one record
    #[arg(short = 't', long)]
    pub record_tag: Option<String>,

    /// Records per shard (must be >= 1) [default: 1000]
    #[arg(short, long, value_parser = parse_positive_usize)]
    pub batch_size: Option<usize>,

    /// Worker threads (must be >= 1) [default: number of CPUs]
    #[arg(short, long, value_parser = parse_positive_usize)]
    pub workers: Option<usize>,

    /// How records are distributed across workers [default: shared]
    #[arg(long, value_enum)]
    pub strategy: Option<Strategy>,

    /// Record queue capacity for the shared strategy [default: 4 x workers]
    #[arg(long, value_parser = parse_positive_usize)]
    pub queue_capacity: Option<usize>,

    #[command(flatten)]
    pub sink: SinkArgs,

    /// Write run statistics as JSON to this file
    #[arg(long)]
    pub stats_json: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Directory holding output_<id>.json shards
    #[arg(short, long, default_value = "json_output")]
    pub dir: PathBuf,

    /// Only load these shard ids (comma-separated or repeated)
    #[arg(long = "shard", value_delimiter = ',')]
    pub shards: Vec<u64>,

    #[command(flatten)]
    pub sink: SinkArgs,
}

#[derive(Args, Debug, Default)]
pub struct SinkArgs {
    /// Bulk-load shards into this sink: file://<dir> or memory://
    #[arg(long)]
    pub sink: Option<String>,

    /// Collection to insert into [default: records]
    #[arg(long)]
    pub collection: Option<String>,

    /// Per-call sink timeout in milliseconds [default: 30000]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub sink_timeout_ms: Option<u64>,

    /// Attempts per shard load, including the first [default: 3]
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub sink_attempts: Option<u32>,
}

impl SinkArgs {
    /// Overlay these flags on `base`. Returns `None` when no sink is named anywhere.
    pub fn apply(&self, base: Option<SinkConfig>) -> Option<SinkConfig> {
        let mut cfg = match (base, &self.sink) {
            (Some(mut cfg), Some(uri)) => {
                cfg.uri.clone_from(uri);
                cfg
            }
            (Some(cfg), None) => cfg,
            (None, Some(uri)) => SinkConfig::new(uri.as_str()),
            (None, None) => return None,
        };
        if let Some(collection) = &self.collection {
            cfg.collection.clone_from(collection);
        }
        if let Some(ms) = self.sink_timeout_ms {
            cfg.timeout_ms = ms;
        }
        if let Some(attempts) = self.sink_attempts {
            cfg.retry.max_attempts = attempts;
        }
        Some(cfg)
    }
}

impl RunArgs {
    /// Resolve the effective configuration: file first, then flags.
    ///
    /// # Errors
    /// Returns an error if the configuration file cannot be loaded.
    pub fn to_config(&self) -> Result<IngestConfig> {
        let mut cfg = match &self.config {
            Some(path) => IngestConfig::from_file(path)?,
            None => IngestConfig::default(),
        };
        if let Some(input) = &self.input {
            cfg.input.clone_from(input);
        }
        if let Some(dir) = &self.output_dir {
            cfg.output_directory.clone_from(dir);
        }
        if let Some(tag) = &self.record_tag {
            cfg.record_tag.clone_from(tag);
        }
        if let Some(n) = self.batch_size {
            cfg.batch_size = n;
        }
        if let Some(n) = self.workers {
            cfg.num_workers = n;
        }
        if let Some(strategy) = self.strategy {
            cfg.strategy = strategy.into();
        }
        if let Some(n) = self.queue_capacity {
            cfg.queue_capacity = Some(n);
        }
        cfg.sink = self.sink.apply(cfg.sink.take());
        Ok(cfg)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Strategy {
    /// One extraction pass feeds a queue drained by every worker
    Shared,
    /// Every worker scans the input and keeps records where ordinal mod workers == worker
    Modulo,
}

impl From<Strategy> for ScanStrategy {
    fn from(s: Strategy) -> Self {
        match s {
            Strategy::Shared => ScanStrategy::Shared,
            Strategy::Modulo => ScanStrategy::Modulo,
        }
    }
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum LogLevel {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warning level
    Warn,
    /// Error level (least verbose)
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Parse a positive usize (>= 1).
fn parse_positive_usize(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if value < 1 {
        return Err(format!("{value} is not in 1.."));
    }
    Ok(value)
}
