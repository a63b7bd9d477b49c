use std::io::{ErrorKind, Read};
use std::time::Duration;

use linkprobe_transport::{is_timeout, LinkStream, TransportError};

use crate::codec::{DecodeStats, Frame, FrameDecoder};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Polls frames out of any `Read` stream.
///
/// A poll performs at most one read. A read that times out is an idle poll,
/// not an error, so callers can interleave polling with their own deadlines.
pub struct FrameReader<T> {
    inner: T,
    decoder: FrameDecoder,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(),
        }
    }

    /// Return the next frame if one is buffered or arrives in a single read.
    ///
    /// Returns `Ok(None)` when the read times out or delivers only part of a
    /// frame, and `Err(FrameError::ConnectionClosed)` at end-of-stream.
    pub fn poll_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.decoder.next_frame() {
            return Ok(Some(frame));
        }
        if !self.fill()? {
            return Ok(None);
        }
        Ok(self.decoder.next_frame())
    }

    /// Perform one read and return every frame that became complete.
    pub fn poll_frames(&mut self) -> Result<Vec<Frame>> {
        let mut frames = self.decoder.drain();
        if frames.is_empty() && self.fill()? {
            frames = self.decoder.drain();
        }
        Ok(frames)
    }

    /// Read once into the decoder. `Ok(false)` on timeout.
    fn fill(&mut self) -> Result<bool> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.decoder.feed(&chunk[..n]);
                    return Ok(true);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_timeout(&err) => return Ok(false),
                Err(err) if is_hangup(&err) => return Err(FrameError::ConnectionClosed),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Decoder counters (frames, CRC errors, discarded bytes).
    pub fn stats(&self) -> DecodeStats {
        self.decoder.stats()
    }

    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl FrameReader<LinkStream> {
    /// Create a frame reader for a `LinkStream`, applying the poll interval as
    /// its read timeout.
    pub fn with_read_timeout(inner: LinkStream, timeout: Duration) -> Result<Self> {
        inner
            .set_read_timeout(Some(timeout))
            .map_err(transport_to_frame_error)?;
        Ok(Self::new(inner))
    }
}

/// The peer went away; treated the same as end-of-stream.
fn is_hangup(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
    )
}

pub(crate) fn transport_to_frame_error(err: TransportError) -> FrameError {
    match err {
        TransportError::Io(io) | TransportError::Accept(io) => FrameError::Io(io),
        TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
            FrameError::Io(source)
        }
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
