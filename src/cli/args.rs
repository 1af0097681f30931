//! CLI argument definitions using clap
//!
//! Commands:
//! - trackdex index --config <path>
//! - trackdex dump --config <path> --bucket <n>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::key::Bucket;

/// trackdex - incremental spatial index over tracking points
#[derive(Parser, Debug)]
#[command(name = "trackdex")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Index NDJSON tracks read from stdin
    Index {
        /// Path to configuration file
        #[arg(long, default_value = "./trackdex.json")]
        config: PathBuf,
    },

    /// Write one bucket's snapshots to stdout as NDJSON
    Dump {
        /// Path to configuration file
        #[arg(long, default_value = "./trackdex.json")]
        config: PathBuf,

        /// Bucket to export
        #[arg(long)]
        bucket: Bucket,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dump() {
        let cli = Cli::try_parse_from(["trackdex", "dump", "--config", "x.json", "--bucket", "3"])
            .unwrap();
        match cli.command {
            Command::Dump { config, bucket } => {
                assert_eq!(config, PathBuf::from("x.json"));
                assert_eq!(bucket, 3);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_index_default_config() {
        let cli = Cli::try_parse_from(["trackdex", "index"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Index { config } if config == PathBuf::from("./trackdex.json")
        ));
    }

    #[test]
    fn test_dump_requires_bucket() {
        assert!(Cli::try_parse_from(["trackdex", "dump"]).is_err());
    }
}
