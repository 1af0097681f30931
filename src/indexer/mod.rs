//! The indexer engine
//!
//! Consumes a stream of tracks for one entity, cuts it into batches and,
//! for every configured bucket in turn:
//!
//! 1. pre-aggregates the batch per key ([`BatchAggregator`])
//! 2. merges each key into its persisted snapshot inside one write
//!    transaction, then commits
//! 3. publishes the touched keys and the lifetime-new keys on the bucket's
//!    feeds
//!
//! # Invariants
//!
//! - One write transaction per (bucket, batch); buckets run sequentially
//! - Feeds only ever carry committed state
//! - A track without a key in a bucket never reaches that bucket's store
//!   or feeds
//! - The first non-skip error stops the call; nothing is retried
//! - After a fatal store error every later `index` call fails fast
//!
//! Buckets are not updated atomically together: when bucket N fails, the
//! buckets before it keep this batch's commit.

mod aggregate;
mod batcher;
mod dump;
mod errors;

pub use aggregate::{AggregateEntry, BatchAggregator};
pub use dump::{collect_dump, spawn_dump, DumpStreams, DUMP_CHANNEL_CAPACITY};
pub use errors::{IndexError, IndexResult};

use std::future::{self, Future};

use futures_util::Stream;
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::accumulator::{Accumulator, VisitAccumulator, VisitConfig};
use crate::cache::LastSeenCache;
use crate::codec::{decode_snapshot, encode_snapshot};
use crate::config::IndexerConfig;
use crate::feed::{FeedKind, FeedReceiver, FeedRegistry};
use crate::key::{Bucket, KeyError, KeyFunction};
use crate::observability::{self, Logger};
use crate::store::{Store, StoreError, StoreReader};
use crate::track::Track;

/// Store namespace holding `bucket`.
pub fn namespace(bucket: Bucket) -> String {
    bucket.to_string()
}

/// Counters for one `index` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexSummary {
    pub batches: u64,
    pub tracks: u64,
    /// (track, bucket) pairs without a key
    pub skipped: u64,
    /// (track, bucket) pairs whose track could not seed an accumulator
    pub rejected: u64,
    pub keys_touched: u64,
    pub keys_written: u64,
    /// Touched keys whose snapshot came out byte-identical
    pub writes_unchanged: u64,
    pub keys_unique: u64,
    /// Feed notifications lost to full subscriber queues
    pub notifications_dropped: u64,
}

/// What one bucket's transaction produced for one batch.
#[derive(Debug, Default)]
struct BucketOutcome {
    touched: Vec<Track>,
    unique: Vec<Track>,
    written: u64,
    unchanged: u64,
}

/// Single-writer indexing engine over one store file.
pub struct Indexer<A: Accumulator, K: KeyFunction> {
    config: IndexerConfig,
    acc_config: A::Config,
    key_fn: K,
    store: Store,
    feeds: FeedRegistry,
    last_seen: Option<LastSeenCache>,
    /// Set once a fatal error has been seen; the handle then refuses work
    halted: Option<String>,
}

/// The engine with the default visit/activity accumulator.
pub type VisitIndexer<K> = Indexer<VisitAccumulator, K>;

impl<K: KeyFunction> Indexer<VisitAccumulator, K> {
    /// Opens an engine whose visit threshold comes from the config.
    pub fn open_visit(config: IndexerConfig, key_fn: K) -> IndexResult<Self> {
        let acc_config = VisitConfig::from_secs(config.visit_threshold_secs);
        Self::open(config, key_fn, acc_config)
    }
}

impl<A: Accumulator, K: KeyFunction> Indexer<A, K> {
    /// Validates `config`, takes the store file and creates every bucket's
    /// namespace.
    ///
    /// # Errors
    ///
    /// Fails on an empty or duplicated bucket set, or when the store is
    /// already held by another engine.
    pub fn open(config: IndexerConfig, key_fn: K, acc_config: A::Config) -> IndexResult<Self> {
        config.validate()?;
        observability::set_min_severity(config.severity()?);

        let mut store = Store::open(&config.store_path)?;
        let mut txn = store.begin_write();
        for bucket in &config.buckets {
            txn.create_namespace(&namespace(*bucket))?;
        }
        txn.commit()?;

        let feeds = FeedRegistry::new(&config.buckets, &config.feed);

        Ok(Self {
            config,
            acc_config,
            key_fn,
            store,
            feeds,
            last_seen: None,
            halted: None,
        })
    }

    /// Injects a last-seen cache, updated after every processed batch.
    pub fn with_last_seen(mut self, cache: LastSeenCache) -> Self {
        self.last_seen = Some(cache);
        self
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.config.buckets
    }

    /// Newest indexed track of `uuid`, if a cache is injected and fresh.
    pub fn last_seen(&self, uuid: &str) -> Option<Track> {
        self.last_seen.as_ref()?.get(uuid).cloned()
    }

    /// Subscribes to one of `bucket`'s feeds.
    pub fn subscribe(&self, bucket: Bucket, kind: FeedKind) -> IndexResult<FeedReceiver> {
        self.feeds
            .feed(bucket, kind)
            .map(|feed| feed.subscribe())
            .ok_or(IndexError::UnknownBucket(bucket))
    }

    /// Whether a fatal store error has stopped this handle.
    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Read-only access to committed state, independent of this handle.
    pub fn reader(&self) -> StoreReader {
        self.store.reader()
    }

    /// Streams every snapshot of `bucket`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dump_bucket(&self, bucket: Bucket) -> DumpStreams {
        if !self.config.buckets.contains(&bucket) {
            let (_, tracks) = mpsc::channel(1);
            let (err_tx, errors) = mpsc::unbounded_channel();
            let _ = err_tx.send(IndexError::UnknownBucket(bucket));
            return (tracks, errors);
        }
        spawn_dump(self.store.reader(), bucket)
    }

    /// Indexes `tracks` until the stream ends.
    pub async fn index<S>(&mut self, tracks: S) -> IndexResult<IndexSummary>
    where
        S: Stream<Item = Track> + Send + 'static,
    {
        self.index_until(tracks, future::pending()).await
    }

    /// Indexes `tracks` until the stream ends or `shutdown` resolves.
    ///
    /// Shutdown is observed between batches (here) and between tracks (in
    /// the buffering stage). A batch already being persisted runs to
    /// completion; a partially filled batch is dropped.
    pub async fn index_until<S, F>(&mut self, tracks: S, shutdown: F) -> IndexResult<IndexSummary>
    where
        S: Stream<Item = Track> + Send + 'static,
        F: Future<Output = ()> + Send,
    {
        if let Some(reason) = &self.halted {
            return Err(IndexError::Store(StoreError::poisoned(format!(
                "Indexer halted after fatal error: {}",
                reason
            ))));
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (batch_tx, mut batch_rx) = mpsc::channel(self.config.buffer_batches);
        let stage = tokio::spawn(batcher::batch_tracks(
            tracks,
            self.config.batch_size,
            batch_tx,
            cancel_rx,
        ));
        tokio::pin!(shutdown);

        let batch_size = self.config.batch_size.to_string();
        let buckets = self.config.buckets.len().to_string();
        Logger::info(
            "INDEX_START",
            &[
                ("batch_size", batch_size.as_str()),
                ("buckets", buckets.as_str()),
            ],
        );

        let mut summary = IndexSummary::default();
        let mut result = loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    Logger::info("INDEX_CANCELLED", &[]);
                    break Ok(());
                }
                next = batch_rx.recv() => next,
            };
            let Some(batch) = next else {
                break Ok(());
            };
            if let Err(e) = self.index_batch(batch, &mut summary).await {
                break Err(e);
            }
        };

        let _ = cancel_tx.send(true);
        drop(batch_rx);
        if let Err(e) = stage.await {
            if result.is_ok() && e.is_panic() {
                result = Err(IndexError::Batcher(e.to_string()));
            }
        }

        match result {
            Ok(()) => {
                let batches = summary.batches.to_string();
                let tracks = summary.tracks.to_string();
                let unique = summary.keys_unique.to_string();
                Logger::info(
                    "INDEX_FINISHED",
                    &[
                        ("batches", batches.as_str()),
                        ("tracks", tracks.as_str()),
                        ("unique", unique.as_str()),
                    ],
                );
                Ok(summary)
            }
            Err(e) => {
                let error = e.to_string();
                Logger::error("INDEX_FAILED", &[("error", error.as_str())]);
                self.note_failure(&e);
                Err(e)
            }
        }
    }

    async fn index_batch(&mut self, batch: Vec<Track>, summary: &mut IndexSummary) -> IndexResult<()> {
        summary.batches += 1;
        summary.tracks += batch.len() as u64;

        let buckets = self.config.buckets.clone();
        for bucket in buckets {
            let aggregator = self.aggregate(bucket, &batch, summary)?;
            if aggregator.is_empty() {
                continue;
            }

            let outcome = self.persist(bucket, aggregator)?;

            summary.keys_touched += outcome.touched.len() as u64;
            summary.keys_written += outcome.written;
            summary.writes_unchanged += outcome.unchanged;
            summary.keys_unique += outcome.unique.len() as u64;

            if let Some(feeds) = self.feeds.bucket(bucket) {
                let touched = feeds.touched.publish(&outcome.touched).await;
                let unique = feeds.unique.publish(&outcome.unique).await;
                summary.notifications_dropped += (touched.dropped + unique.dropped) as u64;
            }
        }

        if let Some(cache) = self.last_seen.as_mut() {
            for track in &batch {
                cache.observe(track);
            }
        }
        Ok(())
    }

    fn aggregate(
        &self,
        bucket: Bucket,
        batch: &[Track],
        summary: &mut IndexSummary,
    ) -> IndexResult<BatchAggregator<A>> {
        let mut aggregator = BatchAggregator::with_capacity(self.config.batch_size);

        for track in batch {
            let key = match self.key_fn.key(track, bucket) {
                Ok(key) => key,
                Err(KeyError::NoKey(reason)) => {
                    summary.skipped += 1;
                    let bucket = bucket.to_string();
                    Logger::debug(
                        "TRACK_NO_KEY",
                        &[
                            ("bucket", bucket.as_str()),
                            ("reason", reason.as_str()),
                            ("uuid", track.uuid.as_str()),
                        ],
                    );
                    continue;
                }
                Err(source) => return Err(IndexError::Key { bucket, source }),
            };

            if let Err(e) = aggregator.add(key, track, &self.acc_config) {
                summary.rejected += 1;
                let bucket = bucket.to_string();
                let error = e.to_string();
                Logger::warn(
                    "TRACK_REJECTED",
                    &[
                        ("bucket", bucket.as_str()),
                        ("error", error.as_str()),
                        ("uuid", track.uuid.as_str()),
                    ],
                );
            }
        }

        Ok(aggregator)
    }

    /// Merges one bucket's batch into the store in a single transaction.
    fn persist(&mut self, bucket: Bucket, aggregator: BatchAggregator<A>) -> IndexResult<BucketOutcome> {
        let ns = namespace(bucket);
        let level = self.config.compression_level;
        let mut outcome = BucketOutcome::default();

        let mut txn = self.store.begin_write();
        txn.create_namespace(&ns)?;

        for entry in aggregator.into_entries() {
            let previous = txn.get(&ns, &entry.key)?;

            let old = match previous.as_deref() {
                Some(bytes) => {
                    let snapshot = decode_snapshot(bytes).map_err(|source| IndexError::Codec {
                        bucket,
                        key: entry.key.clone(),
                        source,
                    })?;
                    A::from_track(&snapshot).map_err(|source| IndexError::Accumulator {
                        bucket,
                        key: entry.key.clone(),
                        source,
                    })?
                }
                None => A::empty(),
            };

            let merged = A::merge(&old, &entry.accumulator, &self.acc_config);
            let projected = merged.apply(&entry.representative);
            let encoded = encode_snapshot(&projected, level).map_err(|source| IndexError::Codec {
                bucket,
                key: entry.key.clone(),
                source,
            })?;

            if previous.as_deref() == Some(encoded.as_slice()) {
                outcome.unchanged += 1;
            } else {
                txn.put(&ns, &entry.key, encoded)?;
                outcome.written += 1;
            }

            if previous.is_none() {
                outcome.unique.push(projected.clone());
            }
            outcome.touched.push(projected);
        }

        txn.commit()?;

        let bucket_str = bucket.to_string();
        let touched = outcome.touched.len().to_string();
        let unique = outcome.unique.len().to_string();
        Logger::debug(
            "BATCH_COMMITTED",
            &[
                ("bucket", bucket_str.as_str()),
                ("touched", touched.as_str()),
                ("unique", unique.as_str()),
            ],
        );

        Ok(outcome)
    }

    /// Halts the handle when `err` leaves the store unusable.
    fn note_failure(&mut self, err: &IndexError) {
        if err.is_fatal() && self.halted.is_none() {
            self.halted = Some(err.to_string());
        }
    }

    /// Releases the store, compacting it first when configured to.
    pub fn close(mut self) -> IndexResult<()> {
        if let Some(reason) = &self.halted {
            Logger::warn("INDEX_CLOSE_SKIPPED_COMPACTION", &[("reason", reason.as_str())]);
        } else if self.config.compact_on_close {
            self.store.compact()?;
        }
        let path = self.store.path().display().to_string();
        drop(self.store);
        Logger::info("INDEX_CLOSED", &[("path", path.as_str())]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreErrorCode;
    use chrono::{TimeZone, Utc};
    use futures_util::stream;
    use tempfile::TempDir;

    use crate::track::Point;

    fn fixed(_: &Track, _: Bucket) -> Result<String, KeyError> {
        Ok("cell".to_string())
    }

    fn track() -> Track {
        let time = Utc.with_ymd_and_hms(2024, 9, 9, 12, 0, 0).unwrap();
        Track::new("dog", time, Point::new(2.35, 48.85))
    }

    #[tokio::test]
    async fn test_recoverable_error_keeps_handle_usable() {
        let dir = TempDir::new().unwrap();
        let config = IndexerConfig::new(dir.path().join("index.log"), vec![0]);
        let mut indexer = VisitIndexer::open_visit(config, fixed).unwrap();

        indexer.note_failure(&IndexError::UnknownBucket(9));
        assert!(!indexer.is_halted());

        let summary = indexer.index(stream::iter(vec![track()])).await.unwrap();
        assert_eq!(summary.tracks, 1);
    }

    #[tokio::test]
    async fn test_fatal_error_halts_handle() {
        let dir = TempDir::new().unwrap();
        let config = IndexerConfig::new(dir.path().join("index.log"), vec![0]);
        let mut indexer = VisitIndexer::open_visit(config, fixed).unwrap();

        indexer.note_failure(&IndexError::Store(StoreError::data_corruption("bad frame")));
        assert!(indexer.is_halted());

        let err = indexer.index(stream::iter(vec![track()])).await.unwrap_err();
        match err {
            IndexError::Store(e) => assert_eq!(e.code(), StoreErrorCode::Poisoned),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(indexer.reader().len("0").unwrap(), 0);

        // Closing a halted handle skips compaction and still releases the file
        indexer.close().unwrap();
    }
}
