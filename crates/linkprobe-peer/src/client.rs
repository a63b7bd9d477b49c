//! Requester side of the command protocol.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use linkprobe_frame::{
    command_name, CommandId, DecodeStats, Frame, FrameReader, FrameWriter, SendOutcome, TxStats,
};
use linkprobe_payload::{
    memory, stream, vartable, AckPayload, Decoded, MemRead, MemValue, StreamConfig,
    VariableDescriptor,
};
use linkprobe_transport::LinkStream;
use tracing::{debug, trace};

use crate::correlation::{correlate, Correlation, Issued};
use crate::error::{PeerError, Result};
use crate::sequence::SequenceCounter;
use crate::streaming::StreamCapture;

/// Timeouts and polling cadence for a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Sleep between polls that returned nothing; also the read timeout for
    /// clients built with [`Client::connect`].
    pub poll_interval: Duration,
    /// Deadline for requests answered by `ACK`.
    pub ack_timeout: Duration,
    /// Deadline for requests answered in kind.
    pub reply_timeout: Duration,
    /// Write timeout for clients built with [`Client::connect`].
    pub write_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5),
            ack_timeout: Duration::from_millis(1500),
            reply_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_millis(500),
        }
    }
}

/// Issues requests over a link and waits for their correlated responses.
///
/// Single-threaded: one request is outstanding at a time, and every wait is
/// bounded by a deadline.
pub struct Client<R, W> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
    sequence: SequenceCounter,
    config: ClientConfig,
}

impl Client<LinkStream, LinkStream> {
    /// Build a client over one duplex stream.
    pub fn connect(stream: LinkStream, config: ClientConfig) -> Result<Self> {
        let read_half = stream.try_clone()?;
        let reader = FrameReader::with_read_timeout(read_half, config.poll_interval)?;
        let writer = FrameWriter::with_write_timeout(stream, config.write_timeout)?;
        Ok(Self::new(reader, writer, config))
    }
}

impl<R: Read, W: Write> Client<R, W> {
    pub fn new(reader: FrameReader<R>, writer: FrameWriter<W>, config: ClientConfig) -> Self {
        Self {
            reader,
            writer,
            sequence: SequenceCounter::new(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Receive-side decoder counters.
    pub fn decode_stats(&self) -> DecodeStats {
        self.reader.stats()
    }

    pub fn tx_stats(&self) -> TxStats {
        self.writer.stats()
    }

    /// Send `command` with `payload` and wait up to `timeout` for the
    /// response that completes it. Unrelated frames are skipped.
    pub fn request(
        &mut self,
        command: CommandId,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Frame> {
        let sequence = self.sequence.next();
        let issued = Issued::new(command, sequence);
        debug!(
            command = command.name(),
            sequence,
            len = payload.len(),
            "sending request"
        );
        if self.writer.send(command.code(), sequence, payload)? == SendOutcome::Dropped {
            return Err(PeerError::NotSent);
        }

        let deadline = Instant::now() + timeout;
        loop {
            match self.reader.poll_frame()? {
                Some(frame) => match correlate(&issued, &frame) {
                    Correlation::Accepted => {
                        debug!(
                            command = command.name(),
                            sequence,
                            reply_sequence = frame.sequence,
                            "request completed"
                        );
                        return Ok(frame);
                    }
                    Correlation::Rejected {
                        status,
                        for_command,
                        for_sequence,
                    } => {
                        return Err(PeerError::Rejected {
                            status,
                            for_command,
                            for_sequence,
                        })
                    }
                    Correlation::NotAMatch => {
                        trace!(
                            command = command_name(frame.command),
                            sequence = frame.sequence,
                            "skipping unrelated frame"
                        );
                    }
                },
                None => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(PeerError::Timeout(timeout));
                    }
                    std::thread::sleep(self.config.poll_interval.min(deadline - now));
                }
            }
            if Instant::now() >= deadline {
                return Err(PeerError::Timeout(timeout));
            }
        }
    }

    fn request_ack(&mut self, command: CommandId, payload: &[u8]) -> Result<AckPayload> {
        let frame = self.request(command, payload, self.config.ack_timeout)?;
        Ok(AckPayload::parse(&frame.payload))
    }

    pub fn ping(&mut self) -> Result<AckPayload> {
        self.request_ack(CommandId::Ping, &[])
    }

    /// Configure streaming. `legacy` sends the two-byte layout.
    pub fn set_stream_config(&mut self, config: StreamConfig, legacy: bool) -> Result<AckPayload> {
        let payload = if legacy {
            config.encode_legacy()
        } else {
            config.encode()
        };
        self.request_ack(CommandId::SetStreamConfig, &payload)
    }

    pub fn get_var_table(&mut self) -> Result<Decoded<VariableDescriptor>> {
        let frame = self.request(CommandId::GetVarTable, &[], self.config.reply_timeout)?;
        Ok(vartable::decode(&frame.payload))
    }

    pub fn read_mem(&mut self, reads: &[MemRead]) -> Result<Decoded<MemValue>> {
        let frame = self.request(
            CommandId::ReadMemBatch,
            &memory::encode_read_request(reads),
            self.config.reply_timeout,
        )?;
        Ok(memory::decode_read_reply(&frame.payload))
    }

    pub fn write_mem(&mut self, writes: &[MemValue]) -> Result<AckPayload> {
        self.request_ack(CommandId::WriteMem, &memory::encode_write_request(writes))
    }

    /// Write with the fixed `address, f32` layout older devices expect.
    pub fn write_mem_legacy(&mut self, writes: &[(u32, f32)]) -> Result<AckPayload> {
        self.request_ack(
            CommandId::WriteMem,
            &memory::encode_write_request_legacy(writes),
        )
    }

    pub fn stream_start(&mut self) -> Result<AckPayload> {
        self.request_ack(CommandId::StreamStart, &[])
    }

    pub fn stream_stop(&mut self) -> Result<AckPayload> {
        self.request_ack(CommandId::StreamStop, &[])
    }

    /// Count stream frames for `window`.
    ///
    /// A frame counts only if its payload length implies a whole number of
    /// channels.
    pub fn capture_stream(&mut self, window: Duration) -> Result<StreamCapture> {
        let started = Instant::now();
        let deadline = started + window;
        let mut capture = StreamCapture::default();
        while Instant::now() < deadline {
            let frames = self.reader.poll_frames()?;
            if frames.is_empty() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                std::thread::sleep(self.config.poll_interval.min(remaining));
                continue;
            }
            for frame in frames {
                if !frame.is(CommandId::StreamData) {
                    capture.other_frames += 1;
                    continue;
                }
                match stream::infer_channel_count(frame.payload.len()) {
                    Some(channels) => {
                        capture.frames += 1;
                        capture.last_channels = channels;
                    }
                    None => capture.rejected += 1,
                }
            }
        }
        capture.elapsed = started.elapsed();
        debug!(
            frames = capture.frames,
            channels = capture.last_channels,
            rejected = capture.rejected,
            "stream capture finished"
        );
        Ok(capture)
    }

    /// Split back into reader and writer.
    pub fn into_parts(self) -> (FrameReader<R>, FrameWriter<W>) {
        (self.reader, self.writer)
    }
}
