//! Shard files: `output_<id>.json`, each a JSON array of records.
//!
//! Shards are written to a hidden temporary file in the same directory,
//! synced, then renamed into place. A reader therefore either sees a complete
//! shard or no shard at all, never one whose contents disagree with its size.

use anyhow::{Context, Result};
use glob::{Pattern, glob};
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const SHARD_PREFIX: &str = "output_";
const SHARD_SUFFIX: &str = ".json";

/// File name of shard `id`.
pub fn shard_file_name(id: u64) -> String {
    format!("{SHARD_PREFIX}{id}{SHARD_SUFFIX}")
}

/// Full path of shard `id` inside `dir`.
pub fn shard_path(dir: impl AsRef<Path>, id: u64) -> PathBuf {
    dir.as_ref().join(shard_file_name(id))
}

/// Extract the shard id from a path named `output_<id>.json`.
pub fn parse_shard_id(path: impl AsRef<Path>) -> Option<u64> {
    path.as_ref()
        .file_name()?
        .to_str()?
        .strip_prefix(SHARD_PREFIX)?
        .strip_suffix(SHARD_SUFFIX)?
        .parse()
        .ok()
}

/// Persist `records` as shard `id` in `dir` (two-space indented JSON array).
///
/// The directory must already exist. An existing shard with the same id is
/// replaced atomically. On failure the temporary file is removed.
///
/// # Errors
/// Returns an error if the temporary file cannot be created, written, synced,
/// or renamed.
pub fn write_shard<T: Serialize>(dir: impl AsRef<Path>, id: u64, records: &[T]) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let path = shard_path(dir, id);
    let tmp = dir.join(format!(".{}.tmp", shard_file_name(id)));

    write_synced(&tmp, id, records)
        .and_then(|()| {
            fs::rename(&tmp, &path)
                .with_context(|| format!("rename {} to {}", tmp.display(), path.display()))
        })
        .inspect_err(|_| {
            let _ = fs::remove_file(&tmp);
        })?;
    Ok(path)
}

fn write_synced<T: Serialize>(tmp: &Path, id: u64, records: &[T]) -> Result<()> {
    let f = File::create(tmp).with_context(|| format!("create {}", tmp.display()))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, records)
        .with_context(|| format!("serialize shard {id} to {}", tmp.display()))?;
    w.write_all(b"\n")?;
    let f = w
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("flush {}", tmp.display()))?;
    f.sync_all().with_context(|| format!("sync {}", tmp.display()))
}

/// Read one shard back as ordered JSON values.
///
/// # Errors
/// Returns an error if the file cannot be opened or is not a JSON array.
pub fn read_shard(path: impl AsRef<Path>) -> Result<Vec<Value>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parse shard {}", path.display()))
}

/// List the shards persisted in `dir`, sorted by id.
///
/// Temporary files from interrupted writes and unrelated files are ignored.
///
/// # Errors
/// Returns an error if the directory cannot be read.
pub fn list_shards(dir: impl AsRef<Path>) -> Result<Vec<(u64, PathBuf)>> {
    let dir = dir.as_ref();
    let pattern = format!(
        "{}/{SHARD_PREFIX}*{SHARD_SUFFIX}",
        Pattern::escape(&dir.to_string_lossy())
    );
    let entries = glob(&pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;

    let mut out = Vec::new();
    for entry in entries {
        let path = entry.with_context(|| format!("error reading glob entry for {pattern}"))?;
        if !path.is_file() {
            continue;
        }
        if let Some(id) = parse_shard_id(&path) {
            out.push((id, path));
        }
    }
    out.sort_by_key(|(id, _)| *id);
    Ok(out)
}
