//! Snapshot codec
//!
//! A snapshot is an exported track serialized as JSON and individually
//! zstd-compressed. JSON keeps snapshots self-describing, so no schema
//! version negotiation is needed to read old stores. Encoding is
//! deterministic: the same track and level always yield the same bytes.

use thiserror::Error;

use crate::track::Track;

/// Default zstd level for snapshot blobs
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Snapshot encode/decode errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Snapshot serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Snapshot compression failed: {0}")]
    Compress(#[source] std::io::Error),

    #[error("Snapshot decompression failed: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("Snapshot deserialization failed: {0}")]
    Deserialize(#[source] serde_json::Error),
}

/// Serialize and compress one snapshot.
pub fn encode_snapshot(track: &Track, level: i32) -> CodecResult<Vec<u8>> {
    let json = serde_json::to_vec(track).map_err(CodecError::Serialize)?;
    zstd::encode_all(json.as_slice(), level).map_err(CodecError::Compress)
}

/// Decompress and deserialize one snapshot.
pub fn decode_snapshot(bytes: &[u8]) -> CodecResult<Track> {
    let json = zstd::decode_all(bytes).map_err(CodecError::Decompress)?;
    serde_json::from_slice(&json).map_err(CodecError::Deserialize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::Point;
    use chrono::{TimeZone, Utc};

    fn sample() -> Track {
        Track::new(
            "cat-7",
            Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap(),
            Point::new(-122.4194, 37.7749),
        )
        .with_property("Count", 12)
        .with_property("Accuracy", 4.5)
    }

    #[test]
    fn test_decode_inverts_encode() {
        let track = sample();
        let bytes = encode_snapshot(&track, DEFAULT_COMPRESSION_LEVEL).unwrap();
        assert_eq!(decode_snapshot(&bytes).unwrap(), track);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = encode_snapshot(&sample(), DEFAULT_COMPRESSION_LEVEL).unwrap();
        let b = encode_snapshot(&sample(), DEFAULT_COMPRESSION_LEVEL).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        let err = decode_snapshot(b"definitely not zstd").unwrap_err();
        assert!(matches!(err, CodecError::Decompress(_)));

        let not_a_track = zstd::encode_all(&b"{\"hello\":1}"[..], 1).unwrap();
        let err = decode_snapshot(&not_a_track).unwrap_err();
        assert!(matches!(err, CodecError::Deserialize(_)));
    }
}
