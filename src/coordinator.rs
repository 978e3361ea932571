//! Run coordination.
//!
//! A [`Coordinator`] validates its [`IngestConfig`], spreads extraction,
//! conversion and shard writing over `num_workers` threads of a dedicated
//! rayon pool, gathers [`RunStats`], and optionally bulk-loads the finished
//! shards into a [`BulkSink`].
//!
//! Two scan strategies are supported:
//! - [`ScanStrategy::Shared`]: the calling thread runs the only extraction
//!   pass and sends record subtrees through a bounded channel. Workers pull
//!   from it, convert, and write shards with ids from one shared counter.
//! - [`ScanStrategy::Modulo`]: every worker opens the input, tokenizes the
//!   whole document, and builds only the records it owns under the modulo
//!   partitioner. Shard ids are strided per worker.
//!
//! A fatal error stops the run without loading. Shards already persisted are
//! kept and reported through [`RunFailed::stats`].

use crate::config::{IngestConfig, ScanStrategy};
use crate::convert::convert;
use crate::element::Element;
use crate::error::RunFailed;
use crate::extract::RecordReader;
use crate::io::open_input;
use crate::partition::{Assignment, Partitioner, ShardIds};
use crate::shard::{ShardHandle, ShardWriter};
use crate::sink::{BulkSink, SinkConfig, load_shards, open_sink};
use crate::stats::{RunStats, WorkerStats};
use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender, bounded};
use std::fs::create_dir_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Cooperative cancellation flag shared between a run and its caller.
///
/// Once triggered, workers stop pulling records, flush their partial shards,
/// and the run returns with [`RunStats::interrupted`] set.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives one ingestion run.
pub struct Coordinator {
    config: IngestConfig,
    sink: Option<Arc<dyn BulkSink>>,
    shutdown: ShutdownSignal,
}

/// What one worker hands back when it finishes.
struct WorkerReport {
    stats: WorkerStats,
    shards: Vec<ShardHandle>,
    error: Option<anyhow::Error>,
}

impl WorkerReport {
    fn new(worker: usize) -> Self {
        Self {
            stats: WorkerStats {
                worker,
                ..WorkerStats::default()
            },
            shards: Vec::new(),
            error: None,
        }
    }

    fn fail(mut self, err: anyhow::Error, abort: &AtomicBool) -> Self {
        abort.store(true, Ordering::SeqCst);
        self.error = Some(err);
        self
    }

    /// Flush the writer unless a write already failed, then collect its shards.
    fn finish(mut self, mut writer: ShardWriter, flush: bool, abort: &AtomicBool) -> Self {
        if flush && let Err(err) = writer.flush() {
            abort.store(true, Ordering::SeqCst);
            self.error.get_or_insert(err);
        }
        self.stats.records = writer.records_written();
        self.stats.persist_time = writer.persist_time();
        self.shards = writer.into_written();
        self.stats.shards = self.shards.len();
        self
    }
}

/// What the shared-scan producer hands back.
#[derive(Default)]
struct ProducerReport {
    records_seen: u64,
    extract_time: Duration,
    interrupted: bool,
    error: Option<anyhow::Error>,
}

impl Coordinator {
    pub fn new(config: IngestConfig) -> Self {
        Self {
            config,
            sink: None,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Load finished shards into `sink` instead of opening `config.sink.uri`.
    ///
    /// Timeout and retry settings still come from `config.sink` when present.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn BulkSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = signal;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// A handle that can stop this run from another thread.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Execute the run.
    ///
    /// # Errors
    ///
    /// Returns [`RunFailed`] if the configuration is invalid, the input cannot
    /// be read or is malformed, or a shard cannot be written. Shards that fail
    /// to load are not errors; they are listed in [`RunStats::load`].
    pub fn run(&self) -> Result<RunStats, RunFailed> {
        let started = Instant::now();
        let cfg = &self.config;
        let early = |err: anyhow::Error| {
            error!(error = %format!("{err:#}"), "run failed before extraction");
            RunFailed::new(
                err,
                RunStats {
                    strategy: cfg.strategy,
                    ..RunStats::default()
                },
            )
        };

        cfg.validate().context("invalid configuration").map_err(early)?;
        create_dir_all(&cfg.output_directory)
            .with_context(|| format!("mkdir -p {}", cfg.output_directory.display()))
            .map_err(early)?;
        let sink = self.resolve_sink().map_err(early)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cfg.num_workers)
            .thread_name(|i| format!("ironshard-worker-{i}"))
            .build()
            .context("build worker pool")
            .map_err(early)?;

        info!(
            input = %cfg.input.display(),
            record_tag = %cfg.record_tag,
            workers = cfg.num_workers,
            batch_size = cfg.batch_size,
            strategy = ?cfg.strategy,
            output = %cfg.output_directory.display(),
            "starting run"
        );

        let (mut stats, failure) = match cfg.strategy {
            ScanStrategy::Shared => self.run_shared(&pool),
            ScanStrategy::Modulo => self.run_modulo(&pool),
        };
        stats.shards.sort_by_key(|s| s.id);

        if let Some(err) = failure {
            stats.elapsed = started.elapsed();
            error!(
                error = %format!("{err:#}"),
                shards = stats.shards.len(),
                records = stats.records,
                "run failed; persisted shards are kept"
            );
            return Err(RunFailed::new(err, stats));
        }
        if stats.interrupted {
            warn!(
                shards = stats.shards.len(),
                records = stats.records,
                "run interrupted; partial shards were flushed"
            );
        }

        match sink {
            Some((sink, sink_cfg)) if !stats.interrupted => {
                let shards: Vec<(u64, PathBuf)> =
                    stats.shards.iter().map(|s| (s.id, s.path.clone())).collect();
                let load_started = Instant::now();
                let load = pool.install(|| load_shards(&sink, &shards, &sink_cfg));
                stats.load_time = load_started.elapsed();
                if load.is_complete() {
                    info!(
                        sink = sink.name(),
                        shards = load.loaded_shards,
                        records = load.loaded_records,
                        "shards loaded"
                    );
                } else {
                    warn!(
                        sink = sink.name(),
                        failed = ?load.failed_ids(),
                        "some shards failed to load; their files are kept"
                    );
                }
                stats.load = Some(load);
            }
            Some(_) => info!("skipping load after shutdown request"),
            None => {}
        }

        stats.elapsed = started.elapsed();
        info!(
            records = stats.records,
            shards = stats.shards.len(),
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "run complete"
        );
        Ok(stats)
    }

    fn resolve_sink(&self) -> Result<Option<(Arc<dyn BulkSink>, SinkConfig)>> {
        let sink_cfg = self.config.sink.clone();
        match (&self.sink, sink_cfg) {
            (Some(sink), cfg) => Ok(Some((Arc::clone(sink), cfg.unwrap_or_default()))),
            (None, Some(cfg)) => {
                let sink = open_sink(&cfg).with_context(|| format!("open sink {}", cfg.uri))?;
                Ok(Some((sink, cfg)))
            }
            (None, None) => Ok(None),
        }
    }

    // ------------------------------------------------------------------------
    // Shared scan
    // ------------------------------------------------------------------------

    fn run_shared(&self, pool: &rayon::ThreadPool) -> (RunStats, Option<anyhow::Error>) {
        let workers = self.config.num_workers;
        let (tx, rx) = bounded::<Element>(self.config.queue_capacity());
        let ids = ShardIds::shared();
        let abort = AtomicBool::new(false);
        let mut reports: Vec<Option<WorkerReport>> = (0..workers).map(|_| None).collect();

        let producer = pool.in_place_scope(|s| {
            for (worker, slot) in reports.iter_mut().enumerate() {
                let rx = rx.clone();
                let ids = ids.clone();
                let abort = &abort;
                s.spawn(move |_| *slot = Some(self.consume(worker, rx, ids, abort)));
            }
            drop(rx);
            self.produce(tx, &abort)
        });

        let mut stats = RunStats {
            strategy: ScanStrategy::Shared,
            records_scanned: producer.records_seen,
            extract_time: producer.extract_time,
            interrupted: producer.interrupted,
            ..RunStats::default()
        };
        let failure = collect(&mut stats, producer.error, reports);
        (stats, failure)
    }

    /// Extract every record on the calling thread and hand it to the workers.
    fn produce(&self, tx: Sender<Element>, abort: &AtomicBool) -> ProducerReport {
        let mut report = ProducerReport::default();
        let input = match open_input(&self.config.input) {
            Ok(input) => input,
            Err(err) => {
                report.error = Some(err);
                return report;
            }
        };
        let mut reader = RecordReader::new(input, self.config.record_tag.as_str());
        loop {
            if self.shutdown.is_triggered() {
                report.interrupted = true;
                break;
            }
            if abort.load(Ordering::SeqCst) {
                break;
            }
            let t = Instant::now();
            let next = reader.next_record();
            report.extract_time += t.elapsed();
            match next {
                Ok(Some(element)) => {
                    if tx.send(element).is_err() {
                        // every worker has stopped
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    report.error = Some(err.context(format!("extract {}", self.config.input.display())));
                    break;
                }
            }
        }
        report.records_seen = reader.records_seen();
        debug!(records = report.records_seen, "producer finished");
        report
    }

    fn consume(
        &self,
        worker: usize,
        rx: Receiver<Element>,
        ids: ShardIds,
        abort: &AtomicBool,
    ) -> WorkerReport {
        let mut report = WorkerReport::new(worker);
        let mut writer = match self.writer(ids) {
            Ok(w) => w,
            Err(err) => return report.fail(err, abort),
        };
        for element in rx.iter() {
            let t = Instant::now();
            let record = convert(&element);
            drop(element);
            report.stats.convert_time += t.elapsed();
            if let Err(err) = writer.accept(record) {
                report = report.fail(err, abort);
                return report.finish(writer, false, abort);
            }
        }
        report.finish(writer, true, abort)
    }

    // ------------------------------------------------------------------------
    // Modulo scan
    // ------------------------------------------------------------------------

    fn run_modulo(&self, pool: &rayon::ThreadPool) -> (RunStats, Option<anyhow::Error>) {
        let abort = AtomicBool::new(false);
        let partitioner = match Partitioner::new(self.config.num_workers) {
            Ok(p) => p,
            Err(err) => return (RunStats::default(), Some(err)),
        };
        let mut reports: Vec<Option<WorkerReport>> =
            (0..partitioner.workers()).map(|_| None).collect();

        pool.in_place_scope(|s| {
            for (assignment, slot) in partitioner.assignments().zip(reports.iter_mut()) {
                let abort = &abort;
                s.spawn(move |_| *slot = Some(self.scan(assignment, abort)));
            }
        });

        let mut stats = RunStats {
            strategy: ScanStrategy::Modulo,
            ..RunStats::default()
        };
        for report in reports.iter().flatten() {
            stats.records_scanned = stats.records_scanned.max(report.stats.records_scanned);
            stats.extract_time += report.stats.extract_time;
        }
        let failure = collect(&mut stats, None, reports);
        (stats, failure)
    }

    /// Scan the whole input, building only the records `assignment` owns.
    fn scan(&self, assignment: Assignment, abort: &AtomicBool) -> WorkerReport {
        let mut report = WorkerReport::new(assignment.worker());
        let mut writer = match self.writer(assignment.shard_ids()) {
            Ok(w) => w,
            Err(err) => return report.fail(err, abort),
        };
        let input = match open_input(&self.config.input) {
            Ok(input) => input,
            Err(err) => return report.fail(err, abort).finish(writer, false, abort),
        };
        let mut reader =
            RecordReader::new(input, self.config.record_tag.as_str()).with_assignment(assignment);
        let mut flush = true;
        loop {
            if self.shutdown.is_triggered() {
                report.stats.interrupted = true;
                break;
            }
            if abort.load(Ordering::SeqCst) {
                break;
            }
            let t = Instant::now();
            let next = reader.next_record();
            report.stats.extract_time += t.elapsed();
            match next {
                Ok(Some(element)) => {
                    let t = Instant::now();
                    let record = convert(&element);
                    drop(element);
                    report.stats.convert_time += t.elapsed();
                    if let Err(err) = writer.accept(record) {
                        report = report.fail(err, abort);
                        flush = false;
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    let err = err.context(format!("extract {}", self.config.input.display()));
                    report = report.fail(err, abort);
                    break;
                }
            }
        }
        report.stats.records_scanned = reader.records_seen();
        report.stats.records_skipped = reader.records_skipped();
        debug!(
            worker = assignment.worker(),
            scanned = report.stats.records_scanned,
            skipped = report.stats.records_skipped,
            "scan finished"
        );
        report.finish(writer, flush, abort)
    }

    fn writer(&self, ids: ShardIds) -> Result<ShardWriter> {
        ShardWriter::new(&self.config.output_directory, self.config.batch_size, ids)
    }
}

/// Fold worker reports into `stats`, returning the first error encountered.
///
/// A producer error takes precedence over worker errors, which are taken in
/// worker order. Further errors are logged and dropped.
fn collect(
    stats: &mut RunStats,
    producer_error: Option<anyhow::Error>,
    reports: Vec<Option<WorkerReport>>,
) -> Option<anyhow::Error> {
    let mut failure = producer_error;
    for (worker, report) in reports.into_iter().enumerate() {
        let Some(report) = report else {
            let err = anyhow!("worker {worker} did not report");
            failure.get_or_insert(err);
            continue;
        };
        if let Some(err) = report.error {
            if failure.is_some() {
                warn!(worker, error = %format!("{err:#}"), "additional worker failure");
            } else {
                failure = Some(err);
            }
        }
        stats.absorb(report.stats, report.shards);
    }
    failure
}

/// Run `config` to completion with no external sink or shutdown handle.
///
/// # Errors
///
/// See [`Coordinator::run`].
pub fn run(config: IngestConfig) -> Result<RunStats, RunFailed> {
    Coordinator::new(config).run()
}
