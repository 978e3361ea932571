//! Run statistics, owned by the coordinator and read-only once a run ends.

use crate::config::ScanStrategy;
use crate::shard::ShardHandle;
use crate::sink::LoadStats;
use serde::{Serialize, Serializer};
use std::time::Duration;

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

/// What one worker did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkerStats {
    pub worker: usize,
    /// Records this worker converted and persisted.
    pub records: u64,
    pub shards: usize,
    /// Record boundaries this worker tokenized (modulo scanning only).
    pub records_scanned: u64,
    /// Records tokenized past because another worker owns them.
    pub records_skipped: u64,
    #[serde(rename = "extract_ms", serialize_with = "as_millis")]
    pub extract_time: Duration,
    #[serde(rename = "convert_ms", serialize_with = "as_millis")]
    pub convert_time: Duration,
    #[serde(rename = "persist_ms", serialize_with = "as_millis")]
    pub persist_time: Duration,
    /// Stopped early because of a shutdown request.
    pub interrupted: bool,
}

/// Totals for a whole run.
///
/// Phase times are summed across workers, so they can exceed `elapsed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub strategy: ScanStrategy,
    /// Records persisted across all shards.
    pub records: u64,
    /// Record boundaries found in the input.
    pub records_scanned: u64,
    /// Every persisted shard, sorted by id.
    pub shards: Vec<ShardHandle>,
    pub workers: Vec<WorkerStats>,
    #[serde(rename = "extract_ms", serialize_with = "as_millis")]
    pub extract_time: Duration,
    #[serde(rename = "convert_ms", serialize_with = "as_millis")]
    pub convert_time: Duration,
    #[serde(rename = "persist_ms", serialize_with = "as_millis")]
    pub persist_time: Duration,
    #[serde(rename = "load_ms", serialize_with = "as_millis")]
    pub load_time: Duration,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    /// A shutdown request stopped extraction before the end of the input.
    pub interrupted: bool,
    /// Present when a bulk sink was configured and loading ran.
    pub load: Option<LoadStats>,
}

impl RunStats {
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_ids(&self) -> Vec<u64> {
        self.shards.iter().map(|s| s.id).collect()
    }

    /// Ids of shards that exist on disk but failed to load.
    pub fn failed_loads(&self) -> Vec<u64> {
        self.load.as_ref().map(LoadStats::failed_ids).unwrap_or_default()
    }

    /// Fold one worker's results into the totals.
    pub(crate) fn absorb(&mut self, worker: WorkerStats, shards: Vec<ShardHandle>) {
        self.records += shards.iter().map(|s| s.records as u64).sum::<u64>();
        self.shards.extend(shards);
        self.convert_time += worker.convert_time;
        self.persist_time += worker.persist_time;
        self.interrupted |= worker.interrupted;
        self.workers.push(worker);
    }
}
