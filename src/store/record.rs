//! Commit frame format
//!
//! Every committed write transaction is exactly one frame in the log:
//!
//! ```text
//! +------------------+
//! | Frame Length     | (u32 LE, whole frame including header and checksum)
//! +------------------+
//! | Length Checksum  | (u32 LE, CRC32 over the length field)
//! +------------------+
//! | Op Count         | (u32 LE)
//! +------------------+
//! | Ops              | (Op Count times)
//! +------------------+
//! | Checksum         | (u32 LE, CRC32 over everything before it)
//! +------------------+
//!
//! Op:
//! | Tag (u8) | Namespace (len-prefixed) | Key (len-prefixed) | Value (len-prefixed) |
//! ```
//!
//! `CreateNamespace` ops carry only the namespace.
//!
//! The length checksum lets a reader trust a length that points past the
//! end of the file: such a frame was cut short by a crash. A length that
//! fails its own checksum is corruption.

use std::io::{self, Cursor, Read};

use crc32fast::Hasher;

const TAG_CREATE_NAMESPACE: u8 = 0;
const TAG_PUT: u8 = 1;

/// Length field plus its checksum.
pub const HEADER_SIZE: usize = 4 + 4;

/// Smallest possible frame: header + op count + checksum.
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + 4 + 4;

/// CRC32 (IEEE) over `data`.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// A single mutation inside a commit frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOp {
    CreateNamespace {
        namespace: String,
    },
    Put {
        namespace: String,
        key: String,
        value: Vec<u8>,
    },
}

/// All mutations of one committed transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitFrame {
    pub ops: Vec<LogOp>,
}

impl CommitFrame {
    pub fn new(ops: Vec<LogOp>) -> Self {
        Self { ops }
    }

    fn serialize_body(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&checked_len(self.ops.len(), "op count")?.to_le_bytes());

        for op in &self.ops {
            match op {
                LogOp::CreateNamespace { namespace } => {
                    buf.push(TAG_CREATE_NAMESPACE);
                    put_bytes(&mut buf, namespace.as_bytes())?;
                }
                LogOp::Put {
                    namespace,
                    key,
                    value,
                } => {
                    buf.push(TAG_PUT);
                    put_bytes(&mut buf, namespace.as_bytes())?;
                    put_bytes(&mut buf, key.as_bytes())?;
                    put_bytes(&mut buf, value)?;
                }
            }
        }

        Ok(buf)
    }

    /// Serialize the complete frame, header and checksum included.
    ///
    /// Fails with `InvalidInput` when the frame or any field does not fit a
    /// u32 length.
    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let body = self.serialize_body()?;
        let frame_length = checked_len(HEADER_SIZE + body.len() + 4, "frame")?;
        let length_bytes = frame_length.to_le_bytes();

        let mut frame = Vec::with_capacity(frame_length as usize);
        frame.extend_from_slice(&length_bytes);
        frame.extend_from_slice(&compute_checksum(&length_bytes).to_le_bytes());
        frame.extend_from_slice(&body);
        let checksum = compute_checksum(&frame);
        frame.extend_from_slice(&checksum.to_le_bytes());

        Ok(frame)
    }

    /// Deserialize one frame from the start of `data`, verifying its checksum.
    ///
    /// Returns the frame and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < MIN_FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Frame too short",
            ));
        }

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&data[..HEADER_SIZE]);
        let frame_length = read_header(&header)?;

        if data.len() < frame_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Frame truncated: expected {} bytes, got {}",
                    frame_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = frame_length - 4;
        let stored = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        let computed = compute_checksum(&data[..checksum_offset]);
        if computed != stored {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Checksum mismatch: computed {:08x}, stored {:08x}",
                    computed, stored
                ),
            ));
        }

        let mut cursor = Cursor::new(&data[HEADER_SIZE..checksum_offset]);
        let op_count = read_u32(&mut cursor)? as usize;
        let mut ops = Vec::with_capacity(op_count.min(4096));

        for _ in 0..op_count {
            let mut tag = [0u8; 1];
            cursor.read_exact(&mut tag)?;
            let op = match tag[0] {
                TAG_CREATE_NAMESPACE => LogOp::CreateNamespace {
                    namespace: read_string(&mut cursor)?,
                },
                TAG_PUT => LogOp::Put {
                    namespace: read_string(&mut cursor)?,
                    key: read_string(&mut cursor)?,
                    value: read_bytes(&mut cursor)?,
                },
                other => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Unknown op tag: {}", other),
                    ))
                }
            };
            ops.push(op);
        }

        if cursor.position() as usize != checksum_offset - HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Trailing bytes after last op",
            ));
        }

        Ok((Self { ops }, frame_length))
    }
}

/// Validates a frame header and returns the frame length it announces.
pub fn read_header(header: &[u8; HEADER_SIZE]) -> io::Result<usize> {
    let length_bytes = [header[0], header[1], header[2], header[3]];
    let stored = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if compute_checksum(&length_bytes) != stored {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Frame length checksum mismatch",
        ));
    }

    let frame_length = u32::from_le_bytes(length_bytes) as usize;
    if frame_length < MIN_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid frame length: {}", frame_length),
        ));
    }
    Ok(frame_length)
}

fn checked_len(len: usize, what: &str) -> io::Result<u32> {
    u32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} length {} exceeds the u32 frame limit", what, len),
        )
    })
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> io::Result<()> {
    buf.extend_from_slice(&checked_len(bytes.len(), "field")?.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_bytes(cursor: &mut Cursor<&[u8]>) -> io::Result<Vec<u8>> {
    let len = read_u32(cursor)? as usize;
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if len > remaining {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Field length {} exceeds frame", len),
        ));
    }
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> io::Result<String> {
    String::from_utf8(read_bytes(cursor)?)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("Invalid UTF-8: {}", e)))
}
