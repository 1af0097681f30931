//! Indexer configuration
//!
//! Loaded from a JSON file or built in code. Everything but the store path
//! and the bucket set has a default. Validation runs before any file is
//! opened, so a bad config never touches the store.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::DEFAULT_COMPRESSION_LEVEL;
use crate::key::Bucket;
use crate::observability::Severity;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("At least one bucket must be configured")]
    NoBuckets,

    #[error("Bucket {0} is configured more than once")]
    DuplicateBucket(Bucket),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// What a feed does when a subscriber's queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedPolicy {
    /// Wait for queue space. Slow subscribers stall ingestion.
    #[default]
    Block,
    /// Never wait. A full queue loses the notification.
    DropNewest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Per-subscriber queue length, in notifications
    pub capacity: usize,
    pub policy: FeedPolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            policy: FeedPolicy::Block,
        }
    }
}

fn default_batch_size() -> usize {
    1000
}

fn default_buffer_batches() -> usize {
    4
}

fn default_visit_threshold_secs() -> u64 {
    3600
}

fn default_compression_level() -> i32 {
    DEFAULT_COMPRESSION_LEVEL
}

fn default_compact_on_close() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration for one indexer instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// The single store file owned by this instance
    pub store_path: PathBuf,
    /// Buckets in processing order
    pub buckets: Vec<Bucket>,
    /// Tracks per batch; also the pre-aggregation capacity
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Complete batches buffered ahead of persistence
    #[serde(default = "default_buffer_batches")]
    pub buffer_batches: usize,
    /// Largest gap (seconds) still counted as the same visit
    #[serde(default = "default_visit_threshold_secs")]
    pub visit_threshold_secs: u64,
    /// zstd level for snapshot blobs
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default = "default_compact_on_close")]
    pub compact_on_close: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl IndexerConfig {
    /// Config with defaults for everything but the path and buckets.
    pub fn new(store_path: impl Into<PathBuf>, buckets: Vec<Bucket>) -> Self {
        Self {
            store_path: store_path.into(),
            buckets,
            batch_size: default_batch_size(),
            buffer_batches: default_buffer_batches(),
            visit_threshold_secs: default_visit_threshold_secs(),
            compression_level: default_compression_level(),
            feed: FeedConfig::default(),
            compact_on_close: default_compact_on_close(),
            log_level: default_log_level(),
        }
    }

    /// Loads and validates a JSON config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_visit_threshold_secs(mut self, secs: u64) -> Self {
        self.visit_threshold_secs = secs;
        self
    }

    pub fn with_feed(mut self, capacity: usize, policy: FeedPolicy) -> Self {
        self.feed = FeedConfig { capacity, policy };
        self
    }

    pub fn with_compact_on_close(mut self, compact: bool) -> Self {
        self.compact_on_close = compact;
        self
    }

    /// Parsed `log_level`.
    pub fn severity(&self) -> ConfigResult<Severity> {
        self.log_level
            .parse()
            .map_err(|reason: String| ConfigError::invalid("log_level", reason))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.buckets.is_empty() {
            return Err(ConfigError::NoBuckets);
        }
        let mut seen = HashSet::new();
        for bucket in &self.buckets {
            if !seen.insert(*bucket) {
                return Err(ConfigError::DuplicateBucket(*bucket));
            }
        }
        if self.store_path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("store_path", "must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "must be at least 1"));
        }
        if self.buffer_batches == 0 {
            return Err(ConfigError::invalid("buffer_batches", "must be at least 1"));
        }
        if self.feed.capacity == 0 {
            return Err(ConfigError::invalid("feed.capacity", "must be at least 1"));
        }
        if !zstd::compression_level_range().contains(&self.compression_level) {
            return Err(ConfigError::invalid(
                "compression_level",
                format!("{} is outside the zstd range", self.compression_level),
            ));
        }
        self.severity()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = IndexerConfig::new("/tmp/cat.tdx", vec![13]);
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.visit_threshold_secs, 3600);
        assert_eq!(config.feed.policy, FeedPolicy::Block);
        assert!(config.compact_on_close);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_buckets_rejected() {
        let err = IndexerConfig::new("/tmp/cat.tdx", vec![]).validate().unwrap_err();
        assert!(matches!(err, ConfigError::NoBuckets));
    }

    #[test]
    fn test_duplicate_bucket_rejected() {
        let err = IndexerConfig::new("/tmp/cat.tdx", vec![3, 5, 3])
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateBucket(3)));
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let base = IndexerConfig::new("/tmp/cat.tdx", vec![1]);
        assert!(base.clone().with_batch_size(0).validate().is_err());
        assert!(base
            .clone()
            .with_feed(0, FeedPolicy::DropNewest)
            .validate()
            .is_err());

        let mut bad_level = base;
        bad_level.log_level = "chatty".into();
        assert!(matches!(
            bad_level.validate().unwrap_err(),
            ConfigError::Invalid { field: "log_level", .. }
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trackdex.json");
        fs::write(
            &path,
            r#"{
                "store_path": "/var/lib/trackdex/cat.tdx",
                "buckets": [2, 4],
                "batch_size": 250,
                "feed": { "policy": "drop_newest" }
            }"#,
        )
        .unwrap();

        let config = IndexerConfig::load(&path).unwrap();
        assert_eq!(config.buckets, vec![2, 4]);
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.feed.policy, FeedPolicy::DropNewest);
        assert_eq!(config.feed.capacity, 64);
        assert_eq!(config.buffer_batches, 4);
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            IndexerConfig::load(&path).unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }
}
