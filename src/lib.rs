//! # Ironshard
//!
//! A **streaming XML-to-JSON sharding engine**. Ironshard reads a large XML
//! document, extracts every element with a chosen tag name, converts each one
//! into a JSON-compatible record, and writes the records out in fixed-size
//! shards (`output_<id>.json`). Work is spread over a pool of worker threads,
//! and finished shards can optionally be bulk-loaded into a document store.
//!
//! ## Key Features
//!
//! - **Bounded memory** - one in-progress record per reader, at most `batch_size` buffered records per worker
//! - **Deterministic conversion** - attributes and children become keys, repeated names become lists
//! - **Two scan strategies** - a shared extraction pass feeding a bounded queue, or modulo partitioning
//! - **Atomic shards** - each shard is written to a temp file, synced, then renamed into place
//! - **Compressed input** - gzip, zstd, bzip2 and xz, detected by extension or magic bytes
//! - **Bulk loading** - parallel loads with per-call timeout and retry with exponential backoff
//!
//! ## Quick Start
//!
//! ```no_run
//! use ironshard::{IngestConfig, run};
//!
//! let config = IngestConfig::new("catalog.xml", "item")
//!     .with_batch_size(1000)
//!     .with_workers(4)
//!     .with_output_directory("json_output");
//!
//! let stats = run(config)?;
//! println!("{} records in {} shards", stats.records, stats.shards.len());
//! # Ok::<(), ironshard::RunFailed>(())
//! ```
//!
//! ## Conversion
//!
//! [`convert()`] maps an [`Element`] to a [`Record`]:
//!
//! ```
//! use ironshard::{Element, convert};
//!
//! let item = Element::new("item")
//!     .with_attr("id", "2")
//!     .with_child(Element::new("val").with_text("5"))
//!     .with_child(Element::new("val").with_text("6"));
//!
//! assert_eq!(
//!     convert(&item).to_value(),
//!     serde_json::json!({"id": "2", "val": ["5", "6"]})
//! );
//! ```
//!
//! ## Feature Flags
//!
//! - `compression-gzip` - gzip input (enabled by default)
//! - `compression-zstd` - zstd input (enabled by default)
//! - `compression-bzip2` - bzip2 input (enabled by default)
//! - `compression-xz` - xz input (enabled by default)
//!
//! ## Module Overview
//!
//! - [`extract`] - Streaming record extraction
//! - [`convert`](mod@convert) - Element to record conversion
//! - [`shard`] - Bounded shard accumulation
//! - [`partition`] - Record ownership and shard id allocation
//! - [`coordinator`] - Worker pool, scan strategies, and the load phase
//! - [`sink`] - Bulk sinks, retry, and timeout
//! - [`io`] - Input decompression and shard files
//! - [`config`] - Run configuration
//! - [`testing`] - Fixtures for tests

pub mod config;
pub mod convert;
pub mod coordinator;
pub mod element;
pub mod error;
pub mod extract;
pub mod io;
pub mod partition;
pub mod shard;
pub mod sink;
pub mod stats;
pub mod testing;

pub use config::{DEFAULT_BATCH_SIZE, IngestConfig, ScanStrategy};
pub use convert::{Field, Fields, Record, TEXT_KEY, convert};
pub use coordinator::{Coordinator, ShutdownSignal, run};
pub use element::Element;
pub use error::{FailureKind, ParseError, RunFailed};
pub use extract::RecordReader;
pub use io::open_input;
pub use io::shards::{list_shards, read_shard, shard_file_name, write_shard};
pub use partition::{Assignment, Partitioner, ShardIds};
pub use shard::{ShardHandle, ShardWriter};
pub use sink::{
    BulkSink, JsonlSink, LoadStats, MemorySink, RetryConfig, SinkConfig, SinkError,
    SinkErrorKind, load_directory, load_shards, open_sink,
};
pub use stats::{RunStats, WorkerStats};
