use std::io::{ErrorKind, Write};
use std::time::Duration;

use bytes::BytesMut;
use linkprobe_transport::LinkStream;
use tracing::debug;

use crate::codec::{encode_frame, Frame, MAX_PAYLOAD, MIN_FRAME_SIZE};
use crate::command::command_name;
use crate::error::{FrameError, Result};
use crate::fault::{FaultInjector, FaultOutcome};
use crate::reader::transport_to_frame_error;

/// Transmit-side counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxStats {
    /// Frames (or raw lines) fully written, corrupted ones included.
    pub frames_sent: u64,
    /// Frames suppressed by the fault injector.
    pub frames_dropped: u64,
    /// Frames written with an injected bit flip.
    pub frames_corrupted: u64,
    /// Writes that failed or timed out.
    pub write_failures: u64,
    pub bytes_sent: u64,
}

/// What happened to a frame handed to [`FrameWriter::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Written with one byte flipped by the fault injector.
    Corrupted,
    /// Suppressed by the fault injector; nothing was written.
    Dropped,
}

/// Writes complete frames to any `Write` stream, optionally through a
/// [`FaultInjector`].
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    faults: Option<FaultInjector>,
    stats: TxStats,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(MIN_FRAME_SIZE + MAX_PAYLOAD),
            faults: None,
            stats: TxStats::default(),
        }
    }

    /// Route every subsequent transmission through `injector`.
    pub fn set_fault_injector(&mut self, injector: Option<FaultInjector>) {
        self.faults = injector.filter(|f| f.config().is_active());
    }

    /// Write a decoded frame back out.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<SendOutcome> {
        self.send(frame.command, frame.sequence, &frame.payload)
    }

    /// Encode and send one frame.
    ///
    /// A write error is counted in [`TxStats::write_failures`] and returned;
    /// the writer stays usable.
    pub fn send(&mut self, command: u8, sequence: u16, payload: &[u8]) -> Result<SendOutcome> {
        self.buf.clear();
        encode_frame(command, sequence, payload, &mut self.buf);

        let outcome = match self.faults.as_mut().map(|f| f.apply(&mut self.buf)) {
            Some(FaultOutcome::Dropped) => {
                self.stats.frames_dropped += 1;
                debug!(command = command_name(command), sequence, "frame dropped");
                return Ok(SendOutcome::Dropped);
            }
            Some(FaultOutcome::Corrupted { offset }) => {
                debug!(
                    command = command_name(command),
                    sequence, offset, "frame corrupted"
                );
                SendOutcome::Corrupted
            }
            Some(FaultOutcome::Clean) | None => SendOutcome::Sent,
        };

        self.write_buffered()?;
        if outcome == SendOutcome::Corrupted {
            self.stats.frames_corrupted += 1;
        }
        Ok(outcome)
    }

    /// Send unframed bytes (CSV stream lines). Only the drop fault applies.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<SendOutcome> {
        if self.faults.as_mut().is_some_and(FaultInjector::should_drop) {
            self.stats.frames_dropped += 1;
            return Ok(SendOutcome::Dropped);
        }
        self.buf.clear();
        self.buf.extend_from_slice(bytes);
        self.write_buffered()?;
        Ok(SendOutcome::Sent)
    }

    fn write_buffered(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => {
                    self.stats.write_failures += 1;
                    return Err(FrameError::ConnectionClosed);
                }
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.stats.write_failures += 1;
                    self.stats.bytes_sent += offset as u64;
                    return Err(FrameError::Io(err));
                }
            }
        }
        self.stats.frames_sent += 1;
        self.stats.bytes_sent += offset as u64;
        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    pub fn stats(&self) -> TxStats {
        self.stats
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl FrameWriter<LinkStream> {
    /// Create a frame writer for a `LinkStream` whose writes give up after
    /// `timeout` instead of blocking under back-pressure.
    pub fn with_write_timeout(inner: LinkStream, timeout: Duration) -> Result<Self> {
        inner
            .set_write_timeout(Some(timeout))
            .map_err(transport_to_frame_error)?;
        Ok(Self::new(inner))
    }
}
