//! Per-bucket notification feeds
//!
//! Every bucket has two feeds:
//!
//! - `Touched`: every key persisted by a batch, with its full merged state
//! - `Unique`: keys that had no snapshot before this batch touched them
//!
//! A notification is always a whole batch's worth of tracks and is only
//! published after the batch's transaction committed. Empty notifications
//! are never sent.
//!
//! # Back-pressure
//!
//! Each subscriber has its own bounded queue. With `FeedPolicy::Block`,
//! publishing waits for space in every queue, so a slow subscriber stalls
//! the indexer's batch loop (and, through the input buffer, the producer).
//! With `FeedPolicy::DropNewest`, publishing never waits and a full queue
//! loses that notification. Subscribers whose receiver was dropped are
//! pruned on the next publish.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::config::{FeedConfig, FeedPolicy};
use crate::key::Bucket;
use crate::observability::Logger;
use crate::track::Track;

/// Receiving half handed to a subscriber.
pub type FeedReceiver = mpsc::Receiver<Vec<Track>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeedKind {
    /// All keys touched by a batch
    Touched,
    /// Keys seen for the first time in the store's lifetime
    Unique,
}

impl FeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Touched => "touched",
            FeedKind::Unique => "unique",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one publish.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishResult {
    /// Subscribers at publish time
    pub subscribers: usize,
    pub delivered: usize,
    /// Lost to full queues (`DropNewest` only)
    pub dropped: usize,
    /// Receivers found closed and pruned
    pub closed: usize,
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    sender: mpsc::Sender<Vec<Track>>,
}

#[derive(Debug, Default)]
struct Subscribers {
    next_id: u64,
    list: Vec<Subscriber>,
}

/// One named output queue set.
#[derive(Debug)]
pub struct Feed {
    bucket: Bucket,
    kind: FeedKind,
    config: FeedConfig,
    subscribers: Mutex<Subscribers>,
}

impl Feed {
    pub fn new(bucket: Bucket, kind: FeedKind, config: FeedConfig) -> Self {
        Self {
            bucket,
            kind,
            config,
            subscribers: Mutex::new(Subscribers::default()),
        }
    }

    pub fn bucket(&self) -> Bucket {
        self.bucket
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    /// Adds a subscriber with its own bounded queue.
    pub fn subscribe(&self) -> FeedReceiver {
        let (tx, rx) = mpsc::channel(self.config.capacity);
        let mut subs = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let id = subs.next_id;
        subs.next_id += 1;
        subs.list.push(Subscriber { id, sender: tx });
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|s| s.list.len())
            .unwrap_or(0)
    }

    /// Hands `batch` to every current subscriber according to the policy.
    pub async fn publish(&self, batch: &[Track]) -> PublishResult {
        let mut result = PublishResult::default();
        if batch.is_empty() {
            return result;
        }

        // Never hold the lock across an await
        let targets: Vec<(u64, mpsc::Sender<Vec<Track>>)> = match self.subscribers.lock() {
            Ok(subs) => subs
                .list
                .iter()
                .map(|s| (s.id, s.sender.clone()))
                .collect(),
            Err(_) => return result,
        };
        result.subscribers = targets.len();

        let mut closed_ids = Vec::new();
        for (id, sender) in targets {
            let outcome = match self.config.policy {
                FeedPolicy::Block => sender
                    .send(batch.to_vec())
                    .await
                    .map_err(|_| TrySendError::Closed(())),
                FeedPolicy::DropNewest => sender
                    .try_send(batch.to_vec())
                    .map_err(|e| match e {
                        TrySendError::Full(_) => TrySendError::Full(()),
                        TrySendError::Closed(_) => TrySendError::Closed(()),
                    }),
            };

            match outcome {
                Ok(()) => result.delivered += 1,
                Err(TrySendError::Full(())) => {
                    result.dropped += 1;
                    let bucket = self.bucket.to_string();
                    let tracks = batch.len().to_string();
                    Logger::warn(
                        "FEED_NOTIFICATION_DROPPED",
                        &[
                            ("bucket", bucket.as_str()),
                            ("feed", self.kind.as_str()),
                            ("tracks", tracks.as_str()),
                        ],
                    );
                }
                Err(TrySendError::Closed(())) => {
                    result.closed += 1;
                    closed_ids.push(id);
                }
            }
        }

        if !closed_ids.is_empty() {
            if let Ok(mut subs) = self.subscribers.lock() {
                subs.list.retain(|s| !closed_ids.contains(&s.id));
            }
        }

        result
    }
}

/// The two feeds of one bucket.
#[derive(Debug)]
pub struct BucketFeeds {
    pub touched: Feed,
    pub unique: Feed,
}

impl BucketFeeds {
    pub fn new(bucket: Bucket, config: &FeedConfig) -> Self {
        Self {
            touched: Feed::new(bucket, FeedKind::Touched, config.clone()),
            unique: Feed::new(bucket, FeedKind::Unique, config.clone()),
        }
    }

    pub fn get(&self, kind: FeedKind) -> &Feed {
        match kind {
            FeedKind::Touched => &self.touched,
            FeedKind::Unique => &self.unique,
        }
    }
}

/// Feeds for every configured bucket. The bucket set is fixed.
#[derive(Debug)]
pub struct FeedRegistry {
    buckets: BTreeMap<Bucket, BucketFeeds>,
}

impl FeedRegistry {
    pub fn new(buckets: &[Bucket], config: &FeedConfig) -> Self {
        Self {
            buckets: buckets
                .iter()
                .map(|b| (*b, BucketFeeds::new(*b, config)))
                .collect(),
        }
    }

    pub fn bucket(&self, bucket: Bucket) -> Option<&BucketFeeds> {
        self.buckets.get(&bucket)
    }

    pub fn feed(&self, bucket: Bucket, kind: FeedKind) -> Option<&Feed> {
        self.bucket(bucket).map(|feeds| feeds.get(kind))
    }
}
