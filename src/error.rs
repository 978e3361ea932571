//! Error types shared across extraction and the run coordinator.

use crate::stats::RunStats;
use std::error::Error;
use std::fmt;

/// Malformed or truncated XML found while tokenizing the input.
///
/// The stream position cannot be recovered after one of these, so extraction
/// stops. Records yielded before the error remain valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Byte offset into the (decompressed) input where the problem was detected.
    pub offset: u64,
    pub message: String,
}

impl ParseError {
    pub fn new(offset: u64, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed XML at byte {}: {}", self.offset, self.message)
    }
}

impl Error for ParseError {}

/// Coarse classification of a fatal run error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The input document is malformed.
    Parse,
    /// Reading the input or writing a shard failed.
    Io,
    Other,
}

impl FailureKind {
    /// Classify an error by the first typed cause found in its chain.
    pub fn classify(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if cause.is::<ParseError>() {
                return FailureKind::Parse;
            }
            if cause.is::<std::io::Error>() {
                return FailureKind::Io;
            }
        }
        FailureKind::Other
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Parse => f.write_str("parse"),
            FailureKind::Io => f.write_str("io"),
            FailureKind::Other => f.write_str("other"),
        }
    }
}

/// A run that stopped on a fatal error.
///
/// Carries the statistics gathered up to the failure, including every shard
/// that was persisted before it. Those files are complete and valid.
#[derive(Debug)]
pub struct RunFailed {
    pub kind: FailureKind,
    pub stats: RunStats,
    error: anyhow::Error,
}

impl RunFailed {
    pub fn new(error: anyhow::Error, stats: RunStats) -> Self {
        Self {
            kind: FailureKind::classify(&error),
            stats,
            error,
        }
    }

    /// The underlying error, with its context chain.
    pub fn error(&self) -> &anyhow::Error {
        &self.error
    }
}

impl fmt::Display for RunFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error after {} shard(s) with {} record(s): {:#}",
            self.kind,
            self.stats.shards.len(),
            self.stats.records,
            self.error
        )
    }
}

impl Error for RunFailed {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.error.as_ref())
    }
}
