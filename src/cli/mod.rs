//! CLI module for trackdex
//!
//! Provides command-line interface for:
//! - index: Index NDJSON tracks from stdin into the configured store
//! - dump: Export one bucket as NDJSON

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{dump, index, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{track_stream, write_line, InputFailure};

/// Parses the process arguments and runs the selected command.
pub fn run() -> CliResult<()> {
    run_command(Cli::parse_args().command)
}
