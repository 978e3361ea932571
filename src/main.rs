//! ironshard CLI
//!
//! Streams an XML document into JSON shards and optionally bulk-loads them.
//!
//! Exit codes: 0 on success, 1 if the run failed, 2 for an invalid
//! configuration, 4 if the run finished but some shards failed to load.

use clap::Parser;
use ironshard::{LoadStats, RunStats, load_directory, open_sink};
use std::path::Path;
use std::process::exit;
use std::time::Instant;

mod cli;

use cli::args::{Cli, Command, LoadArgs, RunArgs};

const EXIT_FAILED: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_PARTIAL: i32 = 4;

fn main() {
    let args = Cli::parse();

    // Logs go to stderr, the summary too; stdout stays empty.
    cli::logging::init_logging(args.log_level);

    let code = match args.command {
        Command::Run(run) => execute_run(&run),
        Command::Load(load) => execute_load(&load),
    };
    if code != 0 {
        exit(code);
    }
}

fn execute_run(args: &RunArgs) -> i32 {
    let config = match args.to_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err:#}");
            return EXIT_USAGE;
        }
    };
    if let Err(err) = config.validate() {
        eprintln!("error: invalid configuration: {err:#}");
        return EXIT_USAGE;
    }

    let (stats, code) = match ironshard::run(config) {
        Ok(stats) => {
            let code = if stats.failed_loads().is_empty() {
                0
            } else {
                EXIT_PARTIAL
            };
            (stats, code)
        }
        Err(failed) => {
            eprintln!("error: {failed}");
            (failed.stats, EXIT_FAILED)
        }
    };

    print_run_summary(&stats);
    if let Some(path) = &args.stats_json
        && let Err(err) = write_stats(path, &stats)
    {
        eprintln!("error: {err:#}");
        return code.max(EXIT_FAILED);
    }
    code
}

fn execute_load(args: &LoadArgs) -> i32 {
    let Some(sink_cfg) = args.sink.apply(None) else {
        eprintln!("error: load needs --sink");
        return EXIT_USAGE;
    };
    let sink = match open_sink(&sink_cfg) {
        Ok(sink) => sink,
        Err(err) => {
            eprintln!("error: {err:#}");
            return EXIT_USAGE;
        }
    };

    let only = (!args.shards.is_empty()).then_some(args.shards.as_slice());
    let started = Instant::now();
    match load_directory(&sink, &args.dir, only, &sink_cfg) {
        Ok(stats) => {
            print_load_summary(&stats);
            eprintln!("  Duration:        {:.2}s", started.elapsed().as_secs_f64());
            if stats.is_complete() { 0 } else { EXIT_PARTIAL }
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            EXIT_FAILED
        }
    }
}

fn write_stats(path: &Path, stats: &RunStats) -> anyhow::Result<()> {
    use anyhow::Context;
    let json = serde_json::to_string_pretty(stats)?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))
}

fn print_run_summary(stats: &RunStats) {
    eprintln!();
    eprintln!("Run {}:", if stats.interrupted { "interrupted" } else { "finished" });
    eprintln!("  Records written: {}", format_number(stats.records));
    eprintln!("  Records scanned: {}", format_number(stats.records_scanned));
    eprintln!("  Shards written:  {}", stats.shards.len());
    eprintln!("  Workers:         {}", stats.workers.len());

    let secs = stats.elapsed.as_secs_f64();
    eprintln!("  Duration:        {secs:.2}s");
    if secs > 0.0 && stats.records > 0 {
        eprintln!(
            "  Throughput:      {} records/sec",
            format_number((stats.records as f64 / secs) as u64)
        );
    }
    if let Some(load) = &stats.load {
        print_load_summary(load);
    }
}

fn print_load_summary(load: &LoadStats) {
    eprintln!("  Shards loaded:   {}", load.loaded_shards);
    eprintln!("  Records loaded:  {}", format_number(load.loaded_records));
    if !load.is_complete() {
        eprintln!("  Failed shards:   {:?}", load.failed_ids());
    }
}

/// Format a large number with commas.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut out = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::format_number;

    #[test]
    fn formats_thousands() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
