use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::command::{command_name, CommandId};
use crate::crc::crc16_ccitt_false;
use crate::error::Result;

/// Start-of-frame marker.
pub const SOF: [u8; 2] = [0xAA, 0x55];

/// Protocol version carried in every frame.
pub const PROTOCOL_VERSION: u8 = 1;

/// Frame header: SOF (2) + version (1) + command (1) + sequence (2) + length (2).
pub const HEADER_SIZE: usize = 8;

/// Trailing CRC size.
pub const CRC_SIZE: usize = 2;

/// Smallest possible frame (empty payload).
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + CRC_SIZE;

/// Largest payload a frame may carry. Longer payloads are truncated on encode
/// and treated as corruption on decode.
pub const MAX_PAYLOAD: usize = 1024;

/// A decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw command byte. Use [`Frame::command_id`] to map it to the command set.
    pub command: u8,
    /// Producer-assigned sequence number.
    pub sequence: u16,
    /// The frame payload (at most [`MAX_PAYLOAD`] bytes).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(command: impl Into<u8>, sequence: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            command: command.into(),
            sequence,
            payload: payload.into(),
        }
    }

    /// The command this frame carries, if it is part of the command set.
    pub fn command_id(&self) -> Result<CommandId> {
        CommandId::try_from(self.command)
    }

    /// True if the frame carries `id`.
    pub fn is(&self, id: CommandId) -> bool {
        self.command == id.code()
    }

    /// The total wire size of this frame, after truncation.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len().min(MAX_PAYLOAD) + CRC_SIZE
    }

    /// Append the encoded frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> usize {
        encode_frame(self.command, self.sequence, &self.payload, dst)
    }
}

/// Encode a frame into the wire format and return the number of bytes written.
///
/// Wire format:
/// ```text
/// ┌───────────┬─────────┬─────────┬──────────┬──────────┬─────────┬──────────┐
/// │ SOF (2B)  │ Version │ Command │ Sequence │ Length   │ Payload │ CRC      │
/// │ 0xAA 0x55 │ (1B)=1  │ (1B)    │ (2B LE)  │ (2B LE)  │ (≤1024) │ (2B LE)  │
/// └───────────┴─────────┴─────────┴──────────┴──────────┴─────────┴──────────┘
/// ```
///
/// The CRC covers version through payload. Payloads longer than
/// [`MAX_PAYLOAD`] are silently truncated.
pub fn encode_frame(command: u8, sequence: u16, payload: &[u8], dst: &mut BytesMut) -> usize {
    let payload = &payload[..payload.len().min(MAX_PAYLOAD)];
    let total = HEADER_SIZE + payload.len() + CRC_SIZE;
    dst.reserve(total);

    let start = dst.len();
    dst.put_slice(&SOF);
    dst.put_u8(PROTOCOL_VERSION);
    dst.put_u8(command);
    dst.put_u16_le(sequence);
    dst.put_u16_le(payload.len() as u16);
    dst.put_slice(payload);
    let crc = crc16_ccitt_false(&dst[start + SOF.len()..]);
    dst.put_u16_le(crc);
    total
}

/// Counters kept by the resynchronizing decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Frames emitted.
    pub frames: u64,
    /// Candidate frames rejected because the CRC did not match.
    pub crc_errors: u64,
    /// Candidate frames rejected because the length field exceeded [`MAX_PAYLOAD`].
    pub oversize_lengths: u64,
    /// Bytes dropped while searching for a valid frame.
    pub discarded_bytes: u64,
}

/// Decode one frame from the front of `src`, skipping corrupted input.
///
/// Returns `None` when no complete valid frame is buffered. Bytes that cannot
/// start a valid frame are consumed; bytes that may still become one are kept.
///
/// A buffer with no start marker is not fully drained: a final `0xAA` stays
/// buffered, so a marker split across two reads is still found. Callers that
/// expect an empty buffer after pure garbage will see [`FrameDecoder::buffered`]
/// report `1` in that case.
pub fn decode_frame(src: &mut BytesMut) -> Option<Frame> {
    decode_with_stats(src, &mut DecodeStats::default())
}

pub(crate) fn decode_with_stats(src: &mut BytesMut, stats: &mut DecodeStats) -> Option<Frame> {
    loop {
        if src.len() < MIN_FRAME_SIZE {
            return None;
        }

        let Some(start) = find_sof(src) else {
            // A trailing 0xAA may be the first half of a marker still in flight.
            let keep = usize::from(src[src.len() - 1] == SOF[0]);
            let dropped = src.len() - keep;
            src.advance(dropped);
            stats.discarded_bytes += dropped as u64;
            return None;
        };
        if start > 0 {
            src.advance(start);
            stats.discarded_bytes += start as u64;
            continue;
        }

        let len = usize::from(u16::from_le_bytes([src[6], src[7]]));
        if len > MAX_PAYLOAD {
            trace!(len, "oversize length field, resyncing");
            src.advance(1);
            stats.oversize_lengths += 1;
            stats.discarded_bytes += 1;
            continue;
        }

        let body_end = HEADER_SIZE + len;
        if src.len() < body_end + CRC_SIZE {
            return None;
        }

        let expected = u16::from_le_bytes([src[body_end], src[body_end + 1]]);
        let actual = crc16_ccitt_false(&src[SOF.len()..body_end]);
        if expected != actual {
            trace!(expected, actual, "crc mismatch, resyncing");
            src.advance(1);
            stats.crc_errors += 1;
            stats.discarded_bytes += 1;
            continue;
        }

        let command = src[3];
        let sequence = u16::from_le_bytes([src[4], src[5]]);
        src.advance(HEADER_SIZE);
        let payload = src.split_to(len).freeze();
        src.advance(CRC_SIZE);
        stats.frames += 1;
        trace!(
            command = command_name(command),
            sequence,
            len,
            "frame decoded"
        );
        return Some(Frame {
            command,
            sequence,
            payload,
        });
    }
}

fn find_sof(buf: &[u8]) -> Option<usize> {
    buf.windows(SOF.len()).position(|w| w == SOF)
}

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Stateful streaming decoder.
///
/// Bytes may be fed in chunks of any size; complete frames come out in order.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    stats: DecodeStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            stats: DecodeStats::default(),
        }
    }

    /// Append received bytes to the receive buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Frame> {
        decode_with_stats(&mut self.buf, &mut self.stats)
    }

    /// All complete frames currently buffered.
    pub fn drain(&mut self) -> Vec<Frame> {
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Bytes held back waiting for more input.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop buffered bytes. Counters are kept.
    pub fn reset(&mut self) {
        self.stats.discarded_bytes += self.buf.len() as u64;
        self.buf.clear();
    }
}
