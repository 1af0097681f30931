//! Last-seen track per entity
//!
//! A bounded, time-evicting map from entity id to the newest track indexed
//! for it. The indexer owns it when one is injected; nothing about it is
//! process-global.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::track::Track;

#[derive(Debug, Clone)]
struct Entry {
    track: Track,
    stored_at: Instant,
}

#[derive(Debug, Clone)]
pub struct LastSeenCache {
    ttl: Duration,
    capacity: usize,
    entries: HashMap<String, Entry>,
}

impl LastSeenCache {
    /// `capacity` is clamped to at least one entry.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn observe(&mut self, track: &Track) {
        self.observe_at(track, Instant::now());
    }

    /// Records `track` unless a newer track for the same entity is cached.
    pub fn observe_at(&mut self, track: &Track, now: Instant) {
        self.evict_expired(now);

        if let Some(existing) = self.entries.get_mut(&track.uuid) {
            if existing.track.time <= track.time {
                existing.track = track.clone();
                existing.stored_at = now;
            }
            return;
        }

        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(
            track.uuid.clone(),
            Entry {
                track: track.clone(),
                stored_at: now,
            },
        );
    }

    pub fn get(&self, uuid: &str) -> Option<&Track> {
        self.get_at(uuid, Instant::now())
    }

    pub fn get_at(&self, uuid: &str, now: Instant) -> Option<&Track> {
        self.entries
            .get(uuid)
            .filter(|e| now.saturating_duration_since(e.stored_at) <= self.ttl)
            .map(|e| &e.track)
    }

    fn evict_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.stored_at) <= ttl);
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.stored_at)
            .map(|(k, _)| k.clone())
        {
            self.entries.remove(&oldest);
        }
    }
}
