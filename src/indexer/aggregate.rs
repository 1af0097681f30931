//! Batch-local pre-aggregation
//!
//! Collapses repeated keys within one batch before the store is touched.
//! One aggregator lives for exactly one (bucket, batch) pair and is sized to
//! the batch, so memory is bounded by the batch size and not by the number
//! of keys ever seen.

use std::collections::HashMap;

use crate::accumulator::{Accumulator, AccumulatorResult};
use crate::track::Track;

/// Everything one batch contributed to one key.
#[derive(Debug, Clone)]
pub struct AggregateEntry<A> {
    pub key: String,
    pub accumulator: A,
    /// Newest observation for the key in this batch
    pub representative: Track,
}

/// Key → accumulator map for a single batch, in first-seen key order.
#[derive(Debug)]
pub struct BatchAggregator<A> {
    positions: HashMap<String, usize>,
    entries: Vec<AggregateEntry<A>>,
}

impl<A: Accumulator> BatchAggregator<A> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: HashMap::with_capacity(capacity),
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Folds `track` into the accumulator for `key`.
    ///
    /// The track also becomes the key's representative, replacing any
    /// earlier one from this batch.
    pub fn add(&mut self, key: String, track: &Track, config: &A::Config) -> AccumulatorResult<()> {
        let observed = A::from_track(track)?;

        match self.positions.get(&key) {
            Some(&idx) => {
                let entry = &mut self.entries[idx];
                entry.accumulator = A::merge(&entry.accumulator, &observed, config);
                entry.representative = track.clone();
            }
            None => {
                self.positions.insert(key.clone(), self.entries.len());
                self.entries.push(AggregateEntry {
                    key,
                    accumulator: A::merge(&A::empty(), &observed, config),
                    representative: track.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&AggregateEntry<A>> {
        self.positions.get(key).map(|&idx| &self.entries[idx])
    }

    pub fn into_entries(self) -> Vec<AggregateEntry<A>> {
        self.entries
    }
}
