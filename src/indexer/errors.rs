//! Indexer errors
//!
//! Only `KeyError::NoKey` is tolerated during indexing, and it never
//! surfaces here. Every variant below aborts the `index` call that hit it.

use thiserror::Error;

use crate::accumulator::AccumulatorError;
use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::key::{Bucket, KeyError};
use crate::store::StoreError;

/// Result type for indexer operations
pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    /// Caller-contract violation at construction
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Bucket {0} is not configured")]
    UnknownBucket(Bucket),

    #[error("Key function failed in bucket {bucket}: {source}")]
    Key {
        bucket: Bucket,
        #[source]
        source: KeyError,
    },

    /// A persisted snapshot no longer decodes into an accumulator
    #[error("Snapshot {bucket}/{key} is not a valid accumulator: {source}")]
    Accumulator {
        bucket: Bucket,
        key: String,
        #[source]
        source: AccumulatorError,
    },

    #[error("Snapshot {bucket}/{key}: {source}")]
    Codec {
        bucket: Bucket,
        key: String,
        #[source]
        source: CodecError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The batching stage died
    #[error("Batching stage failed: {0}")]
    Batcher(String),
}

impl IndexError {
    /// Whether the store handle should be abandoned
    pub fn is_fatal(&self) -> bool {
        matches!(self, IndexError::Store(e) if e.is_fatal())
    }
}
