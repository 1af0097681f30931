//! Track model
//!
//! A track is one geolocation observation of one entity. Beyond identity,
//! time and position, everything lives in an open attribute map so that
//! upstream producers can carry speed, accuracy, elevation and the like
//! without the indexer knowing about them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Property carrying the inferred activity label of a raw track.
pub const PROP_ACTIVITY: &str = "Activity";

/// Property carrying the dwell time (seconds) of a raw track.
pub const PROP_TIME_OFFSET: &str = "TimeOffset";

/// A 2-D position in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lng: f64,
    pub lat: f64,
}

impl Point {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

/// One geolocation event for one tracked entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Entity identifier
    pub uuid: String,
    /// Human-readable entity name
    #[serde(default)]
    pub name: String,
    pub time: DateTime<Utc>,
    pub point: Point,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Track {
    /// Create a track with no properties.
    pub fn new(uuid: impl Into<String>, time: DateTime<Utc>, point: Point) -> Self {
        Self {
            uuid: uuid.into(),
            name: String::new(),
            time,
            point,
            properties: Map::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Activity label of this observation, `Unknown` if absent or unrecognised.
    pub fn activity(&self) -> Activity {
        self.properties
            .get(PROP_ACTIVITY)
            .and_then(Value::as_str)
            .map(Activity::parse)
            .unwrap_or(Activity::Unknown)
    }
}

/// Activity modes tallied per place.
///
/// Declaration order is the tie-break order when picking a dominant mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Activity {
    Stationary,
    Walking,
    Running,
    Cycling,
    Driving,
    Flying,
    Unknown,
}

impl Activity {
    /// Every mode that is counted in a tally.
    pub const TALLIED: [Activity; 6] = [
        Activity::Stationary,
        Activity::Walking,
        Activity::Running,
        Activity::Cycling,
        Activity::Driving,
        Activity::Flying,
    ];

    /// Lenient label parsing; producers disagree on names.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "stationary" | "still" => Activity::Stationary,
            "walking" | "walk" | "onfoot" | "on_foot" => Activity::Walking,
            "running" | "run" => Activity::Running,
            "cycling" | "bike" | "bicycle" | "onbicycle" => Activity::Cycling,
            "driving" | "automotive" | "car" | "invehicle" | "in_vehicle" => Activity::Driving,
            "flying" | "fly" | "plane" => Activity::Flying,
            _ => Activity::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Activity::Stationary => "Stationary",
            Activity::Walking => "Walking",
            Activity::Running => "Running",
            Activity::Cycling => "Cycling",
            Activity::Driving => "Driving",
            Activity::Flying => "Flying",
            Activity::Unknown => "Unknown",
        }
    }

    /// Index into a tally array, `None` for `Unknown`.
    pub fn tally_index(&self) -> Option<usize> {
        Self::TALLIED.iter().position(|a| a == self)
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_activity_aliases() {
        assert_eq!(Activity::parse("Walking"), Activity::Walking);
        assert_eq!(Activity::parse("Bike"), Activity::Cycling);
        assert_eq!(Activity::parse("Automotive"), Activity::Driving);
        assert_eq!(Activity::parse(" fly "), Activity::Flying);
        assert_eq!(Activity::parse("teleporting"), Activity::Unknown);
    }

    #[test]
    fn test_unknown_has_no_tally_slot() {
        assert_eq!(Activity::Unknown.tally_index(), None);
        assert_eq!(Activity::Stationary.tally_index(), Some(0));
        assert_eq!(Activity::Flying.tally_index(), Some(5));
    }

    #[test]
    fn test_track_json_shape() {
        let time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let track = Track::new("cat-1", time, Point::new(-93.25, 44.98))
            .with_property(PROP_ACTIVITY, "Running");

        let json = serde_json::to_value(&track).unwrap();
        assert_eq!(json["uuid"], "cat-1");
        assert_eq!(json["point"]["lat"], 44.98);
        assert_eq!(json["properties"]["Activity"], "Running");

        let back: Track = serde_json::from_value(json).unwrap();
        assert_eq!(back, track);
        assert_eq!(back.activity(), Activity::Running);
    }

    #[test]
    fn test_missing_properties_default() {
        let track: Track = serde_json::from_str(
            r#"{"uuid":"c","time":"2024-05-01T12:00:00Z","point":{"lng":1.0,"lat":2.0}}"#,
        )
        .unwrap();
        assert!(track.properties.is_empty());
        assert_eq!(track.activity(), Activity::Unknown);
    }
}
