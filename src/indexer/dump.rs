//! Bucket export
//!
//! Streams every persisted snapshot of one bucket as a decoded track. The
//! bucket is copied out of the store under a single read lock, so a dump
//! sees one committed state even while an `index` call keeps writing.
//!
//! Per-snapshot decode errors go to the error stream and the dump goes on.
//! A store-level read error is the only error sent and ends both streams.

use tokio::sync::mpsc;

use super::errors::IndexError;
use super::namespace;
use crate::codec::decode_snapshot;
use crate::key::Bucket;
use crate::store::StoreReader;
use crate::track::Track;

/// Tracks buffered ahead of the consumer
pub const DUMP_CHANNEL_CAPACITY: usize = 256;

/// Export streams returned by a dump.
pub type DumpStreams = (mpsc::Receiver<Track>, mpsc::UnboundedReceiver<IndexError>);

/// Spawns a task scanning `bucket` through `reader`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_dump(reader: StoreReader, bucket: Bucket) -> DumpStreams {
    let (track_tx, track_rx) = mpsc::channel(DUMP_CHANNEL_CAPACITY);
    let (err_tx, err_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let entries = match reader.scan(&namespace(bucket)) {
            Ok(entries) => entries,
            Err(e) => {
                let _ = err_tx.send(IndexError::Store(e));
                return;
            }
        };

        for (key, bytes) in entries {
            match decode_snapshot(&bytes) {
                Ok(track) => {
                    if track_tx.send(track).await.is_err() {
                        return;
                    }
                }
                Err(source) => {
                    let _ = err_tx.send(IndexError::Codec {
                        bucket,
                        key,
                        source,
                    });
                }
            }
        }
    });

    (track_rx, err_rx)
}

/// Drains a dump into memory. Returns the tracks and every reported error.
pub async fn collect_dump(streams: DumpStreams) -> (Vec<Track>, Vec<IndexError>) {
    let (mut tracks_rx, mut errors_rx) = streams;
    let mut tracks = Vec::new();
    while let Some(track) = tracks_rx.recv().await {
        tracks.push(track);
    }
    let mut errors = Vec::new();
    while let Some(err) = errors_rx.recv().await {
        errors.push(err);
    }
    (tracks, errors)
}
