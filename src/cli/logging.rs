//! Logging initialization.

use crate::cli::args::LogLevel;
use tracing::Level;
use tracing_subscriber::fmt;

/// Install a `fmt` subscriber at `level`.
///
/// Logs go to stderr so stdout stays clean for program output.
pub fn init_logging(level: LogLevel) {
    let level: Level = level.into();
    fmt::Subscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
