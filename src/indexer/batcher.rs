//! Buffering stage between the producer and the batch loop
//!
//! Cuts the incoming stream into fixed-size batches and hands them over a
//! bounded queue. When the queue is full the stage stops pulling from the
//! stream, which is how back-pressure reaches the producer.

use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};

use crate::track::Track;

/// Runs until the stream ends, the receiver goes away or `cancel` flips.
///
/// A trailing partial batch is flushed when the stream ends and dropped on
/// cancellation.
pub(crate) async fn batch_tracks<S>(
    tracks: S,
    batch_size: usize,
    out: mpsc::Sender<Vec<Track>>,
    mut cancel: watch::Receiver<bool>,
) where
    S: Stream<Item = Track> + Send + 'static,
{
    let mut tracks = Box::pin(tracks);
    let mut batch = Vec::with_capacity(batch_size);

    loop {
        if *cancel.borrow() {
            return;
        }

        let next = tokio::select! {
            biased;
            _ = cancel.changed() => return,
            next = tracks.next() => next,
        };

        match next {
            Some(track) => {
                batch.push(track);
                if batch.len() >= batch_size {
                    let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                    if out.send(full).await.is_err() {
                        return;
                    }
                }
            }
            None => {
                if !batch.is_empty() {
                    let _ = out.send(batch).await;
                }
                return;
            }
        }
    }
}
