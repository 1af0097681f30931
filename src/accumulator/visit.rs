//! Visit/activity histogram accumulator
//!
//! The default "place visited" accumulator. Counts observations, visits
//! (temporally separated sessions), time bounds, summed dwell time and a
//! per-activity tally.
//!
//! # Visits
//!
//! When two accumulators cover disjoint time spans, the gap between the
//! earlier one's `LastTime` and the later one's `FirstTime` decides:
//!
//! - gap > threshold: a re-visit, visit counts add up
//! - gap <= threshold: the last visit of the earlier side and the first
//!   visit of the later side are one visit, so the sum is reduced by one
//!
//! For single-visit operands this is "keep the larger count". Joining the
//! boundary visits keeps the merge associative for multi-visit operands too.
//! Overlapping spans cannot be ordered; the larger visit count is kept.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value;

use super::{Accumulator, AccumulatorError, AccumulatorResult};
use crate::track::{Activity, Track, PROP_ACTIVITY, PROP_TIME_OFFSET};

pub const PROP_COUNT: &str = "Count";
pub const PROP_VISIT_COUNT: &str = "VisitCount";
pub const PROP_FIRST_TIME: &str = "FirstTime";
pub const PROP_LAST_TIME: &str = "LastTime";
pub const PROP_TOTAL_TIME_OFFSET: &str = "TotalTimeOffset";

/// Merge parameters for [`VisitAccumulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisitConfig {
    /// Maximum gap still considered the same visit
    pub visit_threshold: Duration,
}

impl VisitConfig {
    pub fn new(visit_threshold: Duration) -> Self {
        Self { visit_threshold }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::seconds(secs as i64))
    }
}

impl Default for VisitConfig {
    fn default() -> Self {
        Self::from_secs(3600)
    }
}

/// Observation counts per tallied activity mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityTally([u64; Activity::TALLIED.len()]);

impl ActivityTally {
    pub fn record(&mut self, activity: Activity) {
        if let Some(idx) = activity.tally_index() {
            self.0[idx] += 1;
        }
    }

    pub fn get(&self, activity: Activity) -> u64 {
        activity.tally_index().map(|idx| self.0[idx]).unwrap_or(0)
    }

    /// Arg-max mode; ties go to the earlier mode. `Unknown` when nothing is tallied.
    pub fn dominant(&self) -> Activity {
        let mut best = Activity::Unknown;
        let mut best_count = 0;
        for (idx, count) in self.0.iter().enumerate() {
            if *count > best_count {
                best_count = *count;
                best = Activity::TALLIED[idx];
            }
        }
        best
    }

    fn combined(&self, other: &Self) -> Self {
        let mut out = *self;
        for (slot, add) in out.0.iter_mut().zip(other.0.iter()) {
            *slot += add;
        }
        out
    }

    fn property_name(activity: Activity) -> String {
        format!("{}{}", PROP_ACTIVITY, activity.as_str())
    }
}

/// Aggregated visit statistics for one place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisitAccumulator {
    pub count: u64,
    pub visit_count: u64,
    pub first_time: Option<DateTime<Utc>>,
    pub last_time: Option<DateTime<Utc>>,
    /// Summed per-observation dwell, in seconds
    pub total_time_offset: f64,
    pub activity: ActivityTally,
}

impl VisitAccumulator {
    /// Dominant activity across all folded observations.
    pub fn dominant_activity(&self) -> Activity {
        self.activity.dominant()
    }

    fn seed(track: &Track) -> Self {
        let dwell = track
            .property(PROP_TIME_OFFSET)
            .and_then(Value::as_f64)
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .unwrap_or(0.0);

        let mut activity = ActivityTally::default();
        activity.record(track.activity());

        Self {
            count: 1,
            visit_count: 1,
            first_time: Some(track.time),
            last_time: Some(track.time),
            total_time_offset: dwell,
            activity,
        }
    }

    fn decode(track: &Track) -> AccumulatorResult<Self> {
        let count = read_u64(track, PROP_COUNT)?.unwrap_or(0);
        if count == 0 {
            return Ok(Self::empty());
        }

        let visit_count = read_u64(track, PROP_VISIT_COUNT)?
            .ok_or_else(|| AccumulatorError::invalid(PROP_VISIT_COUNT, "missing"))?;
        let first_time = read_time(track, PROP_FIRST_TIME)?;
        let last_time = read_time(track, PROP_LAST_TIME)?;
        if first_time > last_time {
            return Err(AccumulatorError::invalid(
                PROP_FIRST_TIME,
                "later than LastTime",
            ));
        }
        let total_time_offset = match track.property(PROP_TOTAL_TIME_OFFSET) {
            None => 0.0,
            Some(v) => v
                .as_f64()
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .ok_or_else(|| {
                    AccumulatorError::invalid(PROP_TOTAL_TIME_OFFSET, "not a non-negative number")
                })?,
        };

        let mut activity = ActivityTally::default();
        for (idx, mode) in Activity::TALLIED.iter().enumerate() {
            let name = ActivityTally::property_name(*mode);
            if let Some(v) = track.property(&name) {
                activity.0[idx] = v
                    .as_u64()
                    .ok_or_else(|| AccumulatorError::invalid("ActivityTally", format!("{} is not a count", name)))?;
            }
        }

        Ok(Self {
            count,
            visit_count,
            first_time: Some(first_time),
            last_time: Some(last_time),
            total_time_offset,
            activity,
        })
    }

    fn merged_visits(a: &Self, b: &Self, config: &VisitConfig) -> u64 {
        let (Some(a_first), Some(a_last), Some(b_first), Some(b_last)) =
            (a.first_time, a.last_time, b.first_time, b.last_time)
        else {
            return a.visit_count.max(b.visit_count);
        };

        let (early_last, late_first) = if a_first <= b_first {
            (a_last, b_first)
        } else {
            (b_last, a_first)
        };

        if late_first < early_last {
            return a.visit_count.max(b.visit_count);
        }

        let joined = a.visit_count + b.visit_count;
        if late_first - early_last > config.visit_threshold {
            joined
        } else {
            joined.saturating_sub(1).max(1)
        }
    }
}

impl Accumulator for VisitAccumulator {
    type Config = VisitConfig;

    fn empty() -> Self {
        Self::default()
    }

    fn from_track(track: &Track) -> AccumulatorResult<Self> {
        if track.property(PROP_COUNT).is_some() {
            Self::decode(track)
        } else {
            Ok(Self::seed(track))
        }
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn merge(old: &Self, next: &Self, config: &VisitConfig) -> Self {
        if old.is_empty() {
            return next.clone();
        }
        if next.is_empty() {
            return old.clone();
        }

        Self {
            count: old.count + next.count,
            visit_count: Self::merged_visits(old, next, config),
            first_time: old.first_time.min(next.first_time),
            last_time: old.last_time.max(next.last_time),
            total_time_offset: saturating_dwell(old.total_time_offset, next.total_time_offset),
            activity: old.activity.combined(&next.activity),
        }
    }

    fn apply(&self, track: &Track) -> Track {
        let mut out = track.clone();
        let props = &mut out.properties;

        props.insert(PROP_COUNT.into(), self.count.into());
        props.insert(PROP_VISIT_COUNT.into(), self.visit_count.into());
        if let Some(first) = self.first_time {
            props.insert(PROP_FIRST_TIME.into(), format_time(first).into());
        }
        if let Some(last) = self.last_time {
            props.insert(PROP_LAST_TIME.into(), format_time(last).into());
        }
        props.insert(
            PROP_TOTAL_TIME_OFFSET.into(),
            Value::from(self.total_time_offset),
        );
        props.insert(
            PROP_ACTIVITY.into(),
            self.dominant_activity().as_str().into(),
        );
        for mode in Activity::TALLIED {
            props.insert(
                ActivityTally::property_name(mode),
                self.activity.get(mode).into(),
            );
        }

        out
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn read_u64(track: &Track, field: &'static str) -> AccumulatorResult<Option<u64>> {
    match track.property(field) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| AccumulatorError::invalid(field, "not a non-negative integer")),
    }
}

fn read_time(track: &Track, field: &'static str) -> AccumulatorResult<DateTime<Utc>> {
    let raw = track
        .property(field)
        .and_then(Value::as_str)
        .ok_or_else(|| AccumulatorError::invalid(field, "missing"))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AccumulatorError::invalid(field, e.to_string()))
}

/// Sums two dwell totals, pinned at `f64::MAX` so the result stays
/// representable in JSON.
fn saturating_dwell(a: f64, b: f64) -> f64 {
    (a + b).min(f64::MAX)
}
