//! Accumulators: the unit of merge
//!
//! An accumulator is the aggregated knowledge about one key in one bucket.
//! The engine is generic over the accumulator kind; the set of kinds is
//! closed and known at build time, so no trait objects are involved.
//!
//! # Contract
//!
//! - `merge` must be associative. The engine folds a batch into a
//!   batch-local accumulator first and only then into the persisted one, so
//!   different groupings of the same observations must agree.
//! - `from_track` is also the decode path. A track produced by `apply`
//!   must reconstruct the accumulator it was projected from.

mod visit;

pub use visit::{
    ActivityTally, VisitAccumulator, VisitConfig, PROP_COUNT, PROP_FIRST_TIME, PROP_LAST_TIME,
    PROP_TOTAL_TIME_OFFSET, PROP_VISIT_COUNT,
};

use thiserror::Error;

use crate::track::Track;

/// Result type for accumulator operations
pub type AccumulatorResult<T> = Result<T, AccumulatorError>;

/// Accumulator decode errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AccumulatorError {
    /// An exported property was present but unusable
    #[error("Invalid accumulator field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl AccumulatorError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        AccumulatorError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Mergeable aggregate of all observations mapped to one key.
pub trait Accumulator: Clone + Send + Sync + 'static {
    /// Parameters the merge depends on (thresholds and the like).
    type Config: Clone + Send + Sync + 'static;

    /// The zero value with no observations folded in.
    fn empty() -> Self;

    /// Seed from one raw observation, or reconstruct from an exported track.
    fn from_track(track: &Track) -> AccumulatorResult<Self>;

    /// True for the zero value.
    fn is_empty(&self) -> bool;

    /// Combine two accumulators. Either side may be empty.
    fn merge(old: &Self, next: &Self, config: &Self::Config) -> Self;

    /// Project this accumulator onto a copy of `track`.
    fn apply(&self, track: &Track) -> Track;
}
