//! Length-prefixed framing for stream transports.

use std::io::{self, Read, Write};

use thiserror::Error;

/// Largest payload a single frame may carry.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

const HEADER_BYTES: usize = 4;

/// Writes `payload` as one frame and flushes the writer.
///
/// Empty payloads are rejected because the empty frame is reserved for
/// credits; use [`write_credit`] to send one.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError> {
    if payload.is_empty() {
        return Err(FrameError::EmptyPayload);
    }
    let length = encode_length(payload.len())?;
    writer.write_all(&length).map_err(FrameError::Io)?;
    writer.write_all(payload).map_err(FrameError::Io)?;
    writer.flush().map_err(FrameError::Io)
}

/// Writes a zero-length credit frame announcing readiness for one task.
pub fn write_credit<W: Write>(writer: &mut W) -> Result<(), FrameError> {
    writer.write_all(&[0; HEADER_BYTES]).map_err(FrameError::Io)?;
    writer.flush().map_err(FrameError::Io)
}

#[expect(
    clippy::big_endian_bytes,
    reason = "frame lengths are big-endian on the wire"
)]
fn encode_length(length: usize) -> Result<[u8; HEADER_BYTES], FrameError> {
    if length > MAX_FRAME_BYTES {
        return Err(FrameError::TooLarge {
            length,
            limit: MAX_FRAME_BYTES,
        });
    }
    let length = u32::try_from(length).map_err(|_| FrameError::TooLarge {
        length,
        limit: MAX_FRAME_BYTES,
    })?;
    Ok(length.to_be_bytes())
}

#[expect(
    clippy::big_endian_bytes,
    reason = "frame lengths are big-endian on the wire"
)]
fn decode_length(header: [u8; HEADER_BYTES]) -> Result<usize, FrameError> {
    let length = usize::try_from(u32::from_be_bytes(header)).map_err(|_| FrameError::TooLarge {
        length: usize::MAX,
        limit: MAX_FRAME_BYTES,
    })?;
    if length > MAX_FRAME_BYTES {
        return Err(FrameError::TooLarge {
            length,
            limit: MAX_FRAME_BYTES,
        });
    }
    Ok(length)
}

/// Outcome of polling a [`FrameReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePoll {
    /// A complete frame arrived.
    Frame(Vec<u8>),
    /// A zero-length credit frame arrived.
    Credit,
    /// The read timed out before a frame completed; partial bytes are kept.
    Pending,
    /// The peer closed the stream on a frame boundary.
    Closed,
}

/// Incremental frame decoder that survives read timeouts.
///
/// Readers configured with a timeout may return `WouldBlock` or `TimedOut`
/// part way through a frame. The decoder keeps whatever arrived so the next
/// poll resumes where the previous one stopped.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    header: [u8; HEADER_BYTES],
    header_filled: usize,
    payload: Vec<u8>,
    payload_filled: usize,
    expected: Option<usize>,
}

impl<R: Read> FrameReader<R> {
    /// Wraps a byte source.
    #[must_use]
    pub const fn new(inner: R) -> Self {
        Self {
            inner,
            header: [0; HEADER_BYTES],
            header_filled: 0,
            payload: Vec::new(),
            payload_filled: 0,
            expected: None,
        }
    }

    /// Returns a shared reference to the wrapped reader.
    #[must_use]
    pub const fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Returns a mutable reference to the wrapped reader.
    pub const fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Reads until a frame completes, the reader times out, or the peer closes.
    pub fn poll(&mut self) -> Result<FramePoll, FrameError> {
        loop {
            let Some(expected) = self.expected else {
                match self.fill_header()? {
                    Progress::Complete => {
                        let length = decode_length(self.header)?;
                        self.header_filled = 0;
                        if length == 0 {
                            return Ok(FramePoll::Credit);
                        }
                        self.payload = vec![0; length];
                        self.payload_filled = 0;
                        self.expected = Some(length);
                        continue;
                    }
                    Progress::Pending => return Ok(FramePoll::Pending),
                    Progress::Eof if self.header_filled == 0 => return Ok(FramePoll::Closed),
                    Progress::Eof => return Err(FrameError::Truncated),
                }
            };
            return match self.fill_payload(expected)? {
                Progress::Complete => {
                    self.expected = None;
                    self.payload_filled = 0;
                    Ok(FramePoll::Frame(std::mem::take(&mut self.payload)))
                }
                Progress::Pending => Ok(FramePoll::Pending),
                Progress::Eof => Err(FrameError::Truncated),
            };
        }
    }

    /// Blocks until the next frame or credit; `None` when the peer closed.
    ///
    /// Intended for readers without a timeout. A timeout surfaces as
    /// [`FrameError::Io`] with the kind the reader reported.
    pub fn next_frame(&mut self) -> Result<Option<FramePoll>, FrameError> {
        match self.poll()? {
            FramePoll::Closed => Ok(None),
            FramePoll::Pending => Err(FrameError::Io(io::Error::from(io::ErrorKind::TimedOut))),
            other => Ok(Some(other)),
        }
    }

    fn fill_header(&mut self) -> Result<Progress, FrameError> {
        while self.header_filled < HEADER_BYTES {
            let slot = self
                .header
                .get_mut(self.header_filled..)
                .unwrap_or_default();
            match read_some(&mut self.inner, slot)? {
                ReadOutcome::Read(count) => self.header_filled += count,
                ReadOutcome::Pending => return Ok(Progress::Pending),
                ReadOutcome::Eof => return Ok(Progress::Eof),
            }
        }
        Ok(Progress::Complete)
    }

    fn fill_payload(&mut self, expected: usize) -> Result<Progress, FrameError> {
        while self.payload_filled < expected {
            let slot = self
                .payload
                .get_mut(self.payload_filled..)
                .unwrap_or_default();
            match read_some(&mut self.inner, slot)? {
                ReadOutcome::Read(count) => self.payload_filled += count,
                ReadOutcome::Pending => return Ok(Progress::Pending),
                ReadOutcome::Eof => return Ok(Progress::Eof),
            }
        }
        Ok(Progress::Complete)
    }
}

enum Progress {
    Complete,
    Pending,
    Eof,
}

enum ReadOutcome {
    Read(usize),
    Pending,
    Eof,
}

fn read_some<R: Read>(reader: &mut R, buffer: &mut [u8]) -> Result<ReadOutcome, FrameError> {
    loop {
        match reader.read(buffer) {
            Ok(0) => return Ok(ReadOutcome::Eof),
            Ok(count) => return Ok(ReadOutcome::Read(count)),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                return Ok(ReadOutcome::Pending);
            }
            Err(error) => return Err(FrameError::Io(error)),
        }
    }
}

/// Errors raised while framing or deframing a stream.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame length exceeds [`MAX_FRAME_BYTES`].
    #[error("frame of {length} bytes exceeds the {limit} byte limit")]
    TooLarge {
        /// Declared or attempted frame length.
        length: usize,
        /// Configured limit.
        limit: usize,
    },
    /// A data frame was requested for an empty payload.
    #[error("empty payloads are reserved for credit frames")]
    EmptyPayload,
    /// The stream ended part way through a frame.
    #[error("stream closed in the middle of a frame")]
    Truncated,
    /// The underlying stream failed.
    #[error("stream error: {0}")]
    Io(#[source] io::Error),
}
