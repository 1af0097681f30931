//! CLI command implementations
//!
//! Both commands open the store exclusively, so neither can run while
//! another process is indexing into the same file.

use std::io::{self, Write};
use std::path::Path;

use tokio::io::BufReader;
use tokio::runtime::Runtime;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{track_stream, write_json, write_line, InputFailure};
use crate::config::IndexerConfig;
use crate::indexer::{IndexSummary, VisitIndexer};
use crate::key::{Bucket, GridKey};
use crate::observability::Logger;

pub fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Index { config } => index(&config),
        Command::Dump { config, bucket } => dump(&config, bucket),
    }
}

fn runtime() -> CliResult<Runtime> {
    Runtime::new().map_err(|e| CliError::io_error(format!("Failed to start runtime: {}", e)))
}

/// Indexes stdin and prints the summary.
///
/// Tracks are parsed as the indexer pulls them, so input of any length runs
/// in bounded memory. A bad line ends the stream; batches committed before it
/// are kept and the command fails with the line number.
pub fn index(config_path: &Path) -> CliResult<()> {
    let config = IndexerConfig::load(config_path)?;

    let summary: IndexSummary = runtime()?.block_on(async move {
        let failure = InputFailure::default();
        let tracks = track_stream(BufReader::new(tokio::io::stdin()), failure.clone());

        let mut indexer = VisitIndexer::open_visit(config, GridKey)?;
        let summary = indexer.index(tracks).await?;
        indexer.close()?;

        if let Some(err) = failure.take() {
            let batches = summary.batches.to_string();
            Logger::error(
                "CLI_INPUT_FAILED",
                &[("error", err.message()), ("batches_committed", batches.as_str())],
            );
            return Err(err);
        }
        Ok::<_, CliError>(summary)
    })?;

    write_json(&summary)
}

/// Streams a bucket to stdout. The first export error fails the command
/// after every readable snapshot has been written.
pub fn dump(config_path: &Path, bucket: Bucket) -> CliResult<()> {
    let config = IndexerConfig::load(config_path)?.with_compact_on_close(false);

    runtime()?.block_on(async move {
        let indexer = VisitIndexer::open_visit(config, GridKey)?;
        let (mut tracks, mut errors) = indexer.dump_bucket(bucket);

        let mut stdout = io::stdout().lock();
        while let Some(track) = tracks.recv().await {
            write_line(&mut stdout, &track)?;
        }
        stdout.flush()?;
        drop(stdout);

        let mut first = None;
        while let Some(err) = errors.recv().await {
            let error = err.to_string();
            Logger::error("DUMP_ERROR", &[("error", error.as_str())]);
            first.get_or_insert(err);
        }

        indexer.close()?;
        match first {
            Some(err) => Err(CliError::from(err)),
            None => Ok(()),
        }
    })
}
