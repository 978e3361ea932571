//! Record-to-worker assignment and shard identifier allocation.
//!
//! Records are numbered by a 0-based ordinal in document order. A
//! [`Partitioner`] over `W` workers assigns ordinal `i` to worker `i mod W`,
//! which is total, deterministic, and gives every record exactly one owner.
//!
//! Shard identifiers come from a [`ShardIds`] allocator. Under modulo scanning
//! each worker owns the strided namespace `worker, worker + W, worker + 2W, …`,
//! so no coordination is needed. Under shared scanning every writer draws from
//! one atomic counter.

use anyhow::{Result, ensure};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Modulo assignment of record ordinals to `workers` workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Partitioner {
    workers: usize,
}

impl Partitioner {
    /// # Errors
    /// Returns an error if `workers` is zero.
    pub fn new(workers: usize) -> Result<Self> {
        ensure!(workers > 0, "worker count must be positive");
        Ok(Self { workers })
    }

    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// The worker that owns record `ordinal`.
    pub const fn owner(&self, ordinal: u64) -> usize {
        (ordinal % self.workers as u64) as usize
    }

    /// The slice of the record stream owned by `worker`.
    ///
    /// # Errors
    /// Returns an error if `worker` is out of range.
    pub fn assignment(&self, worker: usize) -> Result<Assignment> {
        ensure!(
            worker < self.workers,
            "worker {worker} out of range for {} workers",
            self.workers
        );
        Ok(Assignment {
            worker,
            partitioner: *self,
        })
    }

    /// Every worker's assignment, in worker order.
    pub fn assignments(&self) -> impl Iterator<Item = Assignment> + '_ {
        (0..self.workers).map(|worker| Assignment {
            worker,
            partitioner: *self,
        })
    }
}

/// One worker's share of the record stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Assignment {
    worker: usize,
    partitioner: Partitioner,
}

impl Assignment {
    pub const fn worker(&self) -> usize {
        self.worker
    }

    pub const fn owns(&self, ordinal: u64) -> bool {
        self.partitioner.owner(ordinal) == self.worker
    }

    /// The worker's private shard id namespace.
    pub fn shard_ids(&self) -> ShardIds {
        ShardIds::strided(self.worker as u64, self.partitioner.workers as u64)
    }
}

/// Allocator of run-unique shard identifiers.
#[derive(Clone, Debug)]
pub enum ShardIds {
    /// `next, next + step, next + 2·step, …`
    Strided { next: u64, step: u64 },
    /// One counter shared by every writer of the run.
    Shared(Arc<AtomicU64>),
}

impl ShardIds {
    /// The sequence `start, start + step, …`. A zero step is treated as 1.
    pub fn strided(start: u64, step: u64) -> Self {
        ShardIds::Strided {
            next: start,
            step: step.max(1),
        }
    }

    /// `0, 1, 2, …` for a single writer.
    pub fn sequential() -> Self {
        Self::strided(0, 1)
    }

    /// A fresh shared counter starting at zero. Clone it into each writer.
    pub fn shared() -> Self {
        ShardIds::Shared(Arc::new(AtomicU64::new(0)))
    }

    /// Take the next identifier.
    pub fn next_id(&mut self) -> u64 {
        match self {
            ShardIds::Strided { next, step } => {
                let id = *next;
                *next += *step;
                id
            }
            ShardIds::Shared(counter) => counter.fetch_add(1, Ordering::Relaxed),
        }
    }
}
