//! File-level I/O: opening the input document and persisting shard files.

pub mod compression;
pub mod shards;

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Read buffer size for the input document.
pub const INPUT_BUFFER_BYTES: usize = 256 * 1024;

/// Open the input document for a single forward pass, decompressing if needed.
///
/// Every call returns an independent handle, so concurrent scanners each keep
/// their own cursor.
///
/// # Errors
/// Returns an error if the file cannot be opened or its codec fails to initialize.
pub fn open_input(path: impl AsRef<Path>) -> Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let rdr = compression::auto_detect_reader(f, path)
        .with_context(|| format!("setup decompression for {}", path.display()))?;
    Ok(Box::new(BufReader::with_capacity(INPUT_BUFFER_BYTES, rdr)))
}
