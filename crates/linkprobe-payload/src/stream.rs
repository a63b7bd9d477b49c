//! `STREAM_DATA` payloads and CSV stream lines.

use bytes::{Buf, BufMut};
use serde::Serialize;

use crate::error::{PayloadError, Result};
use crate::MAX_PAYLOAD;

const TIMESTAMP_LEN: usize = 8;
const CHANNEL_LEN: usize = 6;

/// Most channels one stream frame can carry.
pub const MAX_CHANNELS: usize = (MAX_PAYLOAD - TIMESTAMP_LEN) / CHANNEL_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelValue {
    pub channel: u16,
    pub value: f32,
}

/// One multi-channel sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamSample {
    pub timestamp_us: u64,
    pub channels: Vec<ChannelValue>,
}

impl StreamSample {
    /// Sample whose channel ids are the value positions.
    pub fn from_values(timestamp_us: u64, values: &[f32]) -> Self {
        Self {
            timestamp_us,
            channels: values
                .iter()
                .enumerate()
                .map(|(i, &value)| ChannelValue {
                    channel: i as u16,
                    value,
                })
                .collect(),
        }
    }
}

/// Encode `timestamp_us: u64` then `channel: u16, value: f32` per channel.
/// Channels beyond [`MAX_CHANNELS`] are dropped.
pub fn encode(sample: &StreamSample) -> Vec<u8> {
    let channels = &sample.channels[..sample.channels.len().min(MAX_CHANNELS)];
    let mut out = Vec::with_capacity(TIMESTAMP_LEN + channels.len() * CHANNEL_LEN);
    out.put_u64_le(sample.timestamp_us);
    for ch in channels {
        out.put_u16_le(ch.channel);
        out.put_f32_le(ch.value);
    }
    out
}

/// Channel count implied by a stream payload length, if it divides evenly.
pub fn infer_channel_count(payload_len: usize) -> Option<usize> {
    let body = payload_len.checked_sub(TIMESTAMP_LEN)?;
    (body % CHANNEL_LEN == 0).then_some(body / CHANNEL_LEN)
}

pub fn decode(payload: &[u8]) -> Result<StreamSample> {
    let count = infer_channel_count(payload.len()).ok_or(PayloadError::Truncated {
        what: "stream sample",
        offset: payload.len(),
    })?;
    let mut buf = payload;
    let timestamp_us = buf.get_u64_le();
    let channels = (0..count)
        .map(|_| ChannelValue {
            channel: buf.get_u16_le(),
            value: buf.get_f32_le(),
        })
        .collect();
    Ok(StreamSample {
        timestamp_us,
        channels,
    })
}

/// Format values as one CSV line (`v0,v1,...\n`), six decimals each.
pub fn encode_csv_line(values: &[f32]) -> String {
    let mut line = values
        .iter()
        .map(|v| format!("{v:.6}"))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Parse one CSV line. Fields that are not numbers are skipped.
pub fn decode_csv_line(line: &str) -> Vec<f32> {
    line.trim()
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .filter_map(|f| f.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_inference() {
        assert_eq!(infer_channel_count(32), Some(4));
        assert_eq!(infer_channel_count(33), None);
        assert_eq!(infer_channel_count(8), Some(0));
        assert_eq!(infer_channel_count(7), None);
    }

    #[test]
    fn sample_roundtrip() {
        let sample = StreamSample::from_values(1_700_000_000_000_000, &[0.5, -1.25, 3.0, 0.0]);
        let payload = encode(&sample);
        assert_eq!(payload.len(), 32);
        assert_eq!(decode(&payload).unwrap(), sample);
    }

    #[test]
    fn uneven_payload_is_rejected() {
        assert!(decode(&[0u8; 33]).is_err());
    }

    #[test]
    fn channel_cap() {
        let sample = StreamSample::from_values(0, &vec![1.0; 300]);
        let payload = encode(&sample);
        assert!(payload.len() <= MAX_PAYLOAD);
        assert_eq!(infer_channel_count(payload.len()), Some(MAX_CHANNELS));
    }

    #[test]
    fn csv_lines() {
        let line = encode_csv_line(&[0.5, -1.0]);
        assert_eq!(line, "0.500000,-1.000000\n");
        assert_eq!(decode_csv_line(&line), vec![0.5, -1.0]);
        assert_eq!(decode_csv_line(" 1.5, nope ,,2\r\n"), vec![1.5, 2.0]);
    }
}
