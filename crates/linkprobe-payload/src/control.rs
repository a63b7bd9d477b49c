//! `ACK` and `SET_STREAM_CONFIG` payloads.

use bytes::{Buf, BufMut, Bytes};
use serde::{Deserialize, Serialize};

use crate::error::{PayloadError, Result};

/// Bytes needed for the structured acknowledgment fields.
pub const ACK_FIELDS_LEN: usize = 4;

/// Status value meaning success.
pub const ACK_OK: u8 = 0;

/// Status sent for a request whose payload could not be used.
pub const ACK_BAD_PAYLOAD: u8 = 1;

/// Structured acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub status: u8,
    pub for_command: u8,
    pub for_sequence: u16,
    /// Command-specific trailing bytes.
    pub detail: Bytes,
}

impl Ack {
    pub fn ok(for_command: u8, for_sequence: u16) -> Self {
        Self::with_status(ACK_OK, for_command, for_sequence)
    }

    pub fn with_status(status: u8, for_command: u8, for_sequence: u16) -> Self {
        Self {
            status,
            for_command,
            for_sequence,
            detail: Bytes::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ACK_OK
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ACK_FIELDS_LEN + self.detail.len());
        out.put_u8(self.status);
        out.put_u8(self.for_command);
        out.put_u16_le(self.for_sequence);
        out.put_slice(&self.detail);
        out
    }
}

/// An acknowledgment payload as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckPayload {
    Structured(Ack),
    /// Too short to carry fields; accepted unconditionally by requesters.
    Legacy,
}

impl AckPayload {
    pub fn parse(payload: &[u8]) -> Self {
        if payload.len() < ACK_FIELDS_LEN {
            return AckPayload::Legacy;
        }
        let mut buf = payload;
        AckPayload::Structured(Ack {
            status: buf.get_u8(),
            for_command: buf.get_u8(),
            for_sequence: buf.get_u16_le(),
            detail: Bytes::copy_from_slice(buf),
        })
    }
}

/// Streaming parameters set by `SET_STREAM_CONFIG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub channel_count: u8,
    pub stream_rate_hz: u16,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channel_count: 4,
            stream_rate_hz: 200,
        }
    }
}

impl StreamConfig {
    const ENCODED_LEN: usize = 5;
    const LEGACY_LEN: usize = 2;

    /// Zero channel counts and rates are raised to 1.
    pub fn normalized(self) -> Self {
        Self {
            channel_count: self.channel_count.max(1),
            stream_rate_hz: self.stream_rate_hz.max(1),
        }
    }

    /// `channel_count: u8, stream_rate_hz: u16, reserved: u16`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_LEN);
        out.put_u8(self.channel_count);
        out.put_u16_le(self.stream_rate_hz);
        out.put_u16_le(0);
        out
    }

    /// The two-byte form `[channel_count, rate_hz]`; rates above 255 saturate.
    pub fn encode_legacy(&self) -> Vec<u8> {
        vec![
            self.channel_count,
            u8::try_from(self.stream_rate_hz).unwrap_or(u8::MAX),
        ]
    }

    /// Decode the full layout (reserved bytes optional) or the two-byte form.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;
        match payload.len() {
            0 | 1 => Err(PayloadError::Truncated {
                what: "stream config",
                offset: payload.len(),
            }),
            Self::LEGACY_LEN => Ok(Self {
                channel_count: payload[0],
                stream_rate_hz: u16::from(payload[1]),
            }),
            _ => Ok(Self {
                channel_count: buf.get_u8(),
                stream_rate_hz: buf.get_u16_le(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_roundtrip() {
        let ack = Ack::ok(0x01, 513);
        let payload = ack.encode();
        assert_eq!(payload, vec![0x00, 0x01, 0x01, 0x02]);
        assert_eq!(AckPayload::parse(&payload), AckPayload::Structured(ack));
    }

    #[test]
    fn ack_detail_is_kept() {
        let payload = [0x03, 0x12, 0x07, 0x00, 0xDE, 0xAD];
        match AckPayload::parse(&payload) {
            AckPayload::Structured(ack) => {
                assert!(!ack.is_ok());
                assert_eq!(ack.for_command, 0x12);
                assert_eq!(ack.for_sequence, 7);
                assert_eq!(ack.detail.as_ref(), &[0xDE, 0xAD]);
            }
            AckPayload::Legacy => panic!("expected structured ack"),
        }
    }

    #[test]
    fn short_ack_is_legacy() {
        assert_eq!(AckPayload::parse(&[]), AckPayload::Legacy);
        assert_eq!(AckPayload::parse(&[0, 1, 2]), AckPayload::Legacy);
    }

    #[test]
    fn stream_config_layouts() {
        let config = StreamConfig {
            channel_count: 6,
            stream_rate_hz: 1000,
        };
        assert_eq!(config.encode(), vec![6, 0xE8, 0x03, 0, 0]);
        assert_eq!(StreamConfig::decode(&config.encode()).unwrap(), config);
        assert_eq!(StreamConfig::decode(&config.encode()[..3]).unwrap(), config);

        assert_eq!(config.encode_legacy(), vec![6, 255]);
        assert_eq!(
            StreamConfig::decode(&[2, 50]).unwrap(),
            StreamConfig {
                channel_count: 2,
                stream_rate_hz: 50
            }
        );
        assert!(StreamConfig::decode(&[4]).is_err());
    }

    #[test]
    fn normalized_raises_zeroes() {
        let config = StreamConfig {
            channel_count: 0,
            stream_rate_hz: 0,
        }
        .normalized();
        assert_eq!(config.channel_count, 1);
        assert_eq!(config.stream_rate_hz, 1);
    }
}
