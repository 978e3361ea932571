//! Command-line surface of the `ironshard` binary.

pub mod args;
pub mod logging;
