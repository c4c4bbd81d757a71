// Length-delimited framing: [u32 little-endian length][payload]

use crate::error::TransportError;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

pub const LEN_PREFIX: usize = 4;

/// Largest payload a peer may announce.
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|&len| len as usize <= MAX_FRAME_LEN)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("payload too large ({} > {})", payload.len(), MAX_FRAME_LEN),
            )
        })?;
    writer.write_u32::<LittleEndian>(len)?;
    writer.write_all(payload)
}

/// What a single `read_frame` call produced.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Frame(Vec<u8>),
    /// The peer hung up cleanly on a frame boundary.
    Closed,
    /// The stop flag was cleared while waiting for bytes.
    Interrupted,
}

enum Fill {
    Done,
    Eof(usize),
    Interrupted,
}

/// Read one frame.
///
/// Readers with a read timeout surface `WouldBlock`/`TimedOut`; those are
/// treated as a chance to look at `running` and are otherwise retried, so
/// partial frames survive a timeout.
pub fn read_frame<R: Read>(
    reader: &mut R,
    running: Option<&AtomicBool>,
) -> Result<ReadOutcome, TransportError> {
    let mut header = [0u8; LEN_PREFIX];
    match fill(reader, &mut header, running)? {
        Fill::Done => {}
        Fill::Eof(0) => return Ok(ReadOutcome::Closed),
        Fill::Eof(received) => {
            return Err(TransportError::Truncated {
                expected: LEN_PREFIX,
                received,
            })
        }
        Fill::Interrupted => return Ok(ReadOutcome::Interrupted),
    }

    let len = LittleEndian::read_u32(&header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::Oversized {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut payload = vec![0u8; len];
    match fill(reader, &mut payload, running)? {
        Fill::Done => Ok(ReadOutcome::Frame(payload)),
        Fill::Eof(received) => Err(TransportError::Truncated {
            expected: len,
            received,
        }),
        Fill::Interrupted => Ok(ReadOutcome::Interrupted),
    }
}

fn fill<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    running: Option<&AtomicBool>,
) -> Result<Fill, TransportError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(Fill::Eof(filled)),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                if let Some(flag) = running {
                    if !flag.load(Ordering::Acquire) {
                        return Ok(Fill::Interrupted);
                    }
                }
            }
            Err(e) => return Err(TransportError::Receive(e)),
        }
    }
    Ok(Fill::Done)
}
