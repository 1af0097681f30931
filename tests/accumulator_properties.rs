//! Accumulator Property Tests
//!
//! Tests for:
//! - Folding order does not change the result
//! - Visit threshold boundaries
//! - Snapshots survive the codec and decode to the same accumulator

use chrono::{DateTime, Duration, TimeZone, Utc};

use trackdex::accumulator::{Accumulator, VisitAccumulator, VisitConfig};
use trackdex::codec::{decode_snapshot, encode_snapshot, DEFAULT_COMPRESSION_LEVEL};
use trackdex::track::{Activity, Point, Track, PROP_ACTIVITY, PROP_TIME_OFFSET};

// =============================================================================
// Test Utilities
// =============================================================================

fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 9, 12, 0, 0).unwrap() + Duration::seconds(secs)
}

fn seen(secs: i64, activity: &str) -> VisitAccumulator {
    let track = Track::new("dog", at(secs), Point::new(2.35, 48.85))
        .with_property(PROP_ACTIVITY, activity)
        .with_property(PROP_TIME_OFFSET, 5.0);
    VisitAccumulator::from_track(&track).unwrap()
}

fn fold(parts: &[VisitAccumulator], cfg: &VisitConfig) -> VisitAccumulator {
    parts
        .iter()
        .fold(VisitAccumulator::empty(), |acc, next| VisitAccumulator::merge(&acc, next, cfg))
}

// =============================================================================
// Grouping
// =============================================================================

#[test]
fn test_any_batch_split_gives_same_result() {
    let cfg = VisitConfig::from_secs(60);
    let times = [0, 20, 200, 230, 1000, 1010, 1070, 1131, 5000];
    let observations: Vec<_> = times
        .iter()
        .enumerate()
        .map(|(i, t)| seen(*t, if i % 3 == 0 { "Running" } else { "Walking" }))
        .collect();

    let whole = fold(&observations, &cfg);

    for split in 1..observations.len() {
        let (left, right) = observations.split_at(split);
        let combined = VisitAccumulator::merge(&fold(left, &cfg), &fold(right, &cfg), &cfg);
        assert_eq!(combined, whole, "split at {}", split);
    }

    assert_eq!(whole.count, times.len() as u64);
    // Visits: [0,20] [200,230] [1000..1070] [1131] [5000]
    assert_eq!(whole.visit_count, 5);
    assert_eq!(whole.dominant_activity(), Activity::Walking);
}

#[test]
fn test_empty_is_identity() {
    let cfg = VisitConfig::default();
    let one = seen(0, "Cycling");
    assert_eq!(VisitAccumulator::merge(&VisitAccumulator::empty(), &one, &cfg), one);
    assert_eq!(VisitAccumulator::merge(&one, &VisitAccumulator::empty(), &cfg), one);
}

// =============================================================================
// Threshold
// =============================================================================

#[test]
fn test_gap_equal_to_threshold_is_same_visit() {
    let cfg = VisitConfig::from_secs(60);
    let merged = VisitAccumulator::merge(&seen(0, "Walking"), &seen(60, "Walking"), &cfg);
    assert_eq!(merged.visit_count, 1);

    let merged = VisitAccumulator::merge(&seen(0, "Walking"), &seen(61, "Walking"), &cfg);
    assert_eq!(merged.visit_count, 2);
}

#[test]
fn test_offsets_and_counts_add_up() {
    let cfg = VisitConfig::default();
    let merged = fold(&[seen(0, "Walking"), seen(10, "Walking"), seen(20, "Driving")], &cfg);
    assert_eq!(merged.count, 3);
    assert_eq!(merged.total_time_offset, 15.0);
    assert_eq!(merged.first_time, Some(at(0)));
    assert_eq!(merged.last_time, Some(at(20)));
}

// =============================================================================
// Export round-trip
// =============================================================================

#[test]
fn test_snapshot_survives_codec() {
    let cfg = VisitConfig::from_secs(60);
    let acc = fold(
        &[seen(0, "Walking"), seen(30, "Stationary"), seen(4000, "Walking")],
        &cfg,
    );
    let base = Track::new("dog", at(4000), Point::new(2.35, 48.85));

    let bytes = encode_snapshot(&acc.apply(&base), DEFAULT_COMPRESSION_LEVEL).unwrap();
    let decoded = VisitAccumulator::from_track(&decode_snapshot(&bytes).unwrap()).unwrap();

    assert_eq!(decoded, acc);
}

#[test]
fn test_exported_snapshot_merges_like_accumulator() {
    let cfg = VisitConfig::from_secs(60);
    let old = fold(&[seen(0, "Walking"), seen(10, "Walking")], &cfg);
    let base = Track::new("dog", at(10), Point::new(2.35, 48.85));
    let reloaded = VisitAccumulator::from_track(&old.apply(&base)).unwrap();

    let next = seen(40, "Walking");
    assert_eq!(
        VisitAccumulator::merge(&reloaded, &next, &cfg),
        VisitAccumulator::merge(&old, &next, &cfg)
    );
}
