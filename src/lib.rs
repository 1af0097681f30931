//! trackdex - incremental spatial index over tracking points
//!
//! Tracks arrive as a stream, are cut into batches and folded into one
//! accumulated snapshot per (bucket, key) in a crash-safe local store.
//! Every committed batch is announced on two feeds per bucket: all touched
//! keys and keys seen for the first time.
//!
//! # Modules
//!
//! - `track`: the observation type and its activity labels
//! - `key`: bucket/key functions, including the lat/lng grid
//! - `accumulator`: mergeable per-key state (visit and activity counts)
//! - `codec`: snapshot serialization
//! - `store`: append-only transactional key/value log
//! - `feed`: per-bucket notification queues
//! - `cache`: last-seen track per entity
//! - `indexer`: the engine tying the above together
//! - `config`, `observability`, `cli`: ambient plumbing

pub mod accumulator;
pub mod cache;
pub mod cli;
pub mod codec;
pub mod config;
pub mod feed;
pub mod indexer;
pub mod key;
pub mod observability;
pub mod store;
pub mod track;

pub use accumulator::{Accumulator, VisitAccumulator, VisitConfig};
pub use config::{FeedPolicy, IndexerConfig};
pub use feed::{FeedKind, FeedReceiver};
pub use indexer::{IndexError, IndexResult, IndexSummary, Indexer, VisitIndexer};
pub use key::{Bucket, GridKey, KeyError, KeyFunction};
pub use track::{Activity, Point, Track};
