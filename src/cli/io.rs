//! NDJSON I/O for the CLI
//!
//! - Input: one track object per line on stdin, blank lines ignored
//! - Output: one JSON object per line on stdout
//! - UTF-8 only

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use futures_util::{stream, Stream};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::errors::{CliError, CliResult};
use crate::track::Track;

/// First error that ended a track stream early.
#[derive(Debug, Clone, Default)]
pub struct InputFailure(Arc<Mutex<Option<CliError>>>);

impl InputFailure {
    fn record(&self, err: CliError) {
        if let Ok(mut slot) = self.0.lock() {
            slot.get_or_insert(err);
        }
    }

    pub fn take(&self) -> Option<CliError> {
        self.0.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Parses tracks from `input` lazily, one line per pull.
///
/// The stream ends at EOF or at the first unreadable or unparsable line;
/// in the latter case the error (with its 1-based line number) is left in
/// `failure`.
pub fn track_stream<R>(input: R, failure: InputFailure) -> impl Stream<Item = Track> + Send + 'static
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    stream::unfold((input.lines(), 0usize), move |(mut lines, mut line_no)| {
        let failure = failure.clone();
        async move {
            loop {
                line_no += 1;
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => return None,
                    Err(e) => {
                        failure.record(CliError::from(e));
                        return None;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Track>(&line) {
                    Ok(track) => return Some((track, (lines, line_no))),
                    Err(e) => {
                        failure.record(CliError::bad_input(line_no, e));
                        return None;
                    }
                }
            }
        }
    })
}

/// Writes `value` as one line.
pub fn write_line<W: Write, T: Serialize>(out: &mut W, value: &T) -> CliResult<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

pub fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    write_line(&mut stdout, value)?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_track_stream_skips_blank_lines() {
        let input: &'static [u8] = concat!(
            r#"{"uuid":"a","time":"2024-01-01T00:00:00Z","point":{"lng":1.0,"lat":2.0}}"#,
            "\n\n",
            r#"{"uuid":"b","time":"2024-01-01T00:00:10Z","point":{"lng":1.0,"lat":2.0}}"#,
            "\n"
        )
        .as_bytes();
        let failure = InputFailure::default();
        let tracks: Vec<Track> = track_stream(input, failure.clone()).collect().await;
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[1].uuid, "b");
        assert!(failure.take().is_none());
    }

    #[tokio::test]
    async fn test_track_stream_stops_at_bad_line() {
        let input: &'static [u8] = concat!(
            r#"{"uuid":"a","time":"2024-01-01T00:00:00Z","point":{"lng":1.0,"lat":2.0}}"#,
            "\n\n{\"uuid\":\"b\"}\n",
            r#"{"uuid":"c","time":"2024-01-01T00:00:10Z","point":{"lng":1.0,"lat":2.0}}"#,
            "\n"
        )
        .as_bytes();
        let failure = InputFailure::default();
        let tracks: Vec<Track> = track_stream(input, failure.clone()).collect().await;
        assert_eq!(tracks.len(), 1);
        let err = failure.take().unwrap();
        assert!(err.message().starts_with("line 3:"));
    }

    #[tokio::test]
    async fn test_track_stream_is_lazy() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let failure = InputFailure::default();
        let mut tracks = Box::pin(track_stream(tokio::io::BufReader::new(reader), failure));

        use tokio::io::AsyncWriteExt;
        writer
            .write_all(br#"{"uuid":"a","time":"2024-01-01T00:00:00Z","point":{"lng":1.0,"lat":2.0}}"#)
            .await
            .unwrap();
        writer.write_all(b"\n").await.unwrap();

        // First track arrives while the input is still open
        assert_eq!(tracks.next().await.unwrap().uuid, "a");
        drop(writer);
        assert!(tracks.next().await.is_none());
    }

    #[test]
    fn test_write_line_appends_newline() {
        let mut buf = Vec::new();
        write_line(&mut buf, &serde_json::json!({"a": 1})).unwrap();
        assert_eq!(buf, b"{\"a\":1}\n");
    }
}
