//! Key functions
//!
//! A key function decides which accumulator group a track belongs to in a
//! bucket. The indexer treats it as a black box; spatial-cell tokenizers
//! and reverse-geocode lookups live with the caller.

use thiserror::Error;

use crate::track::Track;

/// One reduction dimension instance (a cell level, a region dataset, ...).
pub type Bucket = u8;

/// Key derivation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    /// The track has no key in this bucket. Skip it, do not fail.
    #[error("No key: {0}")]
    NoKey(String),

    /// Key derivation failed. Aborts the batch.
    #[error("Key function failed: {0}")]
    Failed(String),
}

impl KeyError {
    pub fn no_key(reason: impl Into<String>) -> Self {
        KeyError::NoKey(reason.into())
    }

    pub fn is_no_key(&self) -> bool {
        matches!(self, KeyError::NoKey(_))
    }
}

/// Maps a track to its grouping key in one bucket.
pub trait KeyFunction: Send + Sync {
    fn key(&self, track: &Track, bucket: Bucket) -> Result<String, KeyError>;
}

impl<F> KeyFunction for F
where
    F: Fn(&Track, Bucket) -> Result<String, KeyError> + Send + Sync,
{
    fn key(&self, track: &Track, bucket: Bucket) -> Result<String, KeyError> {
        self(track, bucket)
    }
}

/// Rounds positions to a lat/lng grid. The bucket is the number of decimal
/// places kept, so bucket 2 yields cells of roughly one kilometre.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridKey;

impl GridKey {
    /// Finest supported precision
    pub const MAX_PRECISION: Bucket = 8;
}

impl KeyFunction for GridKey {
    fn key(&self, track: &Track, bucket: Bucket) -> Result<String, KeyError> {
        if bucket > Self::MAX_PRECISION {
            return Err(KeyError::Failed(format!(
                "grid precision {} exceeds {}",
                bucket,
                Self::MAX_PRECISION
            )));
        }

        let p = &track.point;
        if !p.lat.is_finite() || !p.lng.is_finite() {
            return Err(KeyError::no_key("non-finite position"));
        }
        if !(-90.0..=90.0).contains(&p.lat) || !(-180.0..=180.0).contains(&p.lng) {
            return Err(KeyError::no_key("position out of range"));
        }

        let precision = bucket as usize;
        let scale = 10f64.powi(bucket as i32);
        // Floor rather than round so cells tile without overlap
        let lat = (p.lat * scale).floor() / scale;
        let lng = (p.lng * scale).floor() / scale;
        Ok(format!("{:.*},{:.*}", precision, lat, precision, lng))
    }
}
