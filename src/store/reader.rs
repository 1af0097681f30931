//! Sequential log reader used for replay on open
//!
//! Every frame is checksum-verified. A frame cut short by the end of the
//! file (a partial header, or an intact header whose length runs past EOF)
//! is a torn write from an interrupted commit and is reported as such.
//! Anything else that fails to parse, including a header whose length
//! fails its checksum, is corruption.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::errors::{StoreError, StoreResult};
use super::record::{read_header, CommitFrame, HEADER_SIZE};

/// Outcome of reading at the current offset.
#[derive(Debug)]
pub enum FrameRead {
    Frame(CommitFrame),
    /// Clean end of log
    End,
    /// Incomplete final frame starting at `offset`
    TornTail { offset: u64 },
}

pub struct LogReader {
    reader: BufReader<File>,
    current_offset: u64,
    file_size: u64,
}

impl LogReader {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let file = File::open(path).map_err(|e| {
            StoreError::read_failed(format!("Failed to open store log: {}", path.display()), e)
        })?;
        let file_size = file
            .metadata()
            .map_err(|e| StoreError::read_failed("Failed to read store log metadata", e))?
            .len();

        Ok(Self {
            reader: BufReader::new(file),
            current_offset: 0,
            file_size,
        })
    }

    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    pub fn read_next(&mut self) -> StoreResult<FrameRead> {
        if self.current_offset >= self.file_size {
            return Ok(FrameRead::End);
        }

        let remaining = self.file_size - self.current_offset;
        if remaining < HEADER_SIZE as u64 {
            return Ok(FrameRead::TornTail {
                offset: self.current_offset,
            });
        }

        let mut header = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header).map_err(|e| {
            StoreError::corruption_at_offset(
                self.current_offset,
                format!("Failed to read frame header: {}", e),
            )
        })?;
        let frame_length = read_header(&header)
            .map_err(|e| StoreError::corruption_at_offset(self.current_offset, e.to_string()))?
            as u64;

        // The length is checksummed, so a frame running past EOF was cut
        // short by an interrupted append rather than damaged
        if frame_length > remaining {
            return Ok(FrameRead::TornTail {
                offset: self.current_offset,
            });
        }

        let mut frame_buf = vec![0u8; frame_length as usize];
        frame_buf[..HEADER_SIZE].copy_from_slice(&header);
        self.reader.read_exact(&mut frame_buf[HEADER_SIZE..]).map_err(|e| {
            StoreError::corruption_at_offset(
                self.current_offset,
                format!("Failed to read frame body: {}", e),
            )
        })?;

        let (frame, consumed) = CommitFrame::deserialize(&frame_buf)
            .map_err(|e| StoreError::corruption_at_offset(self.current_offset, e.to_string()))?;

        self.current_offset += consumed as u64;
        Ok(FrameRead::Frame(frame))
    }
}
