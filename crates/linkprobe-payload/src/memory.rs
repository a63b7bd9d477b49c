//! `READ_MEM_BATCH` and `WRITE_MEM` payloads.

use bytes::{Buf, BufMut};
use serde::Serialize;
use tracing::debug;

use crate::error::{PayloadError, Result};
use crate::numeric::decode_numeric;
use crate::types::{DataType, Decoded, WireFormat};
use crate::MAX_PAYLOAD;

const READ_ENTRY_LEN: usize = 6;
const LEGACY_WRITE_ENTRY_LEN: usize = 8;

/// One address to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemRead {
    pub address: u32,
    pub size: u16,
}

/// A raw value at an address.
///
/// Text replies carry decimal floats; they are stored as 4-byte little-endian
/// `f32` so every value has the same raw-bytes shape regardless of source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemValue {
    pub address: u32,
    pub raw: Vec<u8>,
}

impl MemValue {
    pub fn new(address: u32, raw: impl Into<Vec<u8>>) -> Self {
        Self {
            address,
            raw: raw.into(),
        }
    }

    pub fn from_f32(address: u32, value: f32) -> Self {
        Self::new(address, value.to_le_bytes())
    }

    pub fn from_f64(address: u32, value: f64) -> Self {
        Self::new(address, value.to_le_bytes())
    }

    /// Encode `value` at the natural width of `data_type`.
    pub fn typed(address: u32, data_type: DataType, value: f64) -> Self {
        Self::new(address, data_type.encode_value(value))
    }

    /// Value decoded by width.
    pub fn value(&self) -> Option<f64> {
        decode_numeric(&self.raw)
    }
}

/// Encode a read request: repeated `address: u32, size: u16`.
pub fn encode_read_request(reads: &[MemRead]) -> Vec<u8> {
    let mut out = Vec::with_capacity(reads.len() * READ_ENTRY_LEN);
    for read in reads.iter().take(MAX_PAYLOAD / READ_ENTRY_LEN) {
        out.put_u32_le(read.address);
        out.put_u16_le(read.size);
    }
    out
}

/// Decode a read request. A trailing partial entry is ignored.
pub fn decode_read_request(payload: &[u8]) -> Vec<MemRead> {
    payload
        .chunks_exact(READ_ENTRY_LEN)
        .map(|mut entry| MemRead {
            address: entry.get_u32_le(),
            size: entry.get_u16_le(),
        })
        .collect()
}

/// Encode a read reply in the requested format.
///
/// Binary: `count: u16` then `address: u32, size: u16, raw`. Text:
/// `0xADDRESS=value` pairs joined by `,`, values decoded by width and printed
/// with six decimals. Entries that would exceed 1024 bytes are left out.
pub fn encode_read_reply(values: &[MemValue], format: WireFormat) -> Vec<u8> {
    match format {
        WireFormat::Binary => {
            let mut out = Vec::with_capacity(MAX_PAYLOAD);
            out.put_u16_le(0);
            let mut count = 0u16;
            for value in values {
                let raw = &value.raw[..value.raw.len().min(usize::from(u16::MAX))];
                if out.len() + READ_ENTRY_LEN + raw.len() > MAX_PAYLOAD {
                    break;
                }
                out.put_u32_le(value.address);
                out.put_u16_le(raw.len() as u16);
                out.put_slice(raw);
                count += 1;
            }
            out[..2].copy_from_slice(&count.to_le_bytes());
            out
        }
        WireFormat::Text => {
            let mut out = String::new();
            for value in values {
                let pair = format!(
                    "0x{:08X}={:.6}",
                    value.address,
                    value.value().unwrap_or(0.0)
                );
                let sep = usize::from(!out.is_empty());
                if out.len() + sep + pair.len() > MAX_PAYLOAD {
                    break;
                }
                if sep == 1 {
                    out.push(',');
                }
                out.push_str(&pair);
            }
            out.into_bytes()
        }
    }
}

/// Try binary, then text.
pub fn decode_read_reply(payload: &[u8]) -> Decoded<MemValue> {
    match decode_read_reply_binary(payload) {
        Ok(values) => return Decoded::Binary(values),
        Err(err) => debug!(%err, "read reply is not binary, trying text"),
    }
    match decode_read_reply_text(payload) {
        Ok(values) => Decoded::Text(values),
        Err(err) => {
            debug!(%err, "read reply is not text either");
            Decoded::Unknown
        }
    }
}

/// Strict binary decoding. Fails on truncation or an empty reply.
pub fn decode_read_reply_binary(payload: &[u8]) -> Result<Vec<MemValue>> {
    let mut buf = payload;
    if buf.remaining() < 2 {
        return Err(PayloadError::Truncated {
            what: "read reply",
            offset: 0,
        });
    }
    let count = buf.get_u16_le();
    let mut values = Vec::new();
    for _ in 0..count {
        let offset = payload.len() - buf.remaining();
        if buf.remaining() < READ_ENTRY_LEN {
            return Err(PayloadError::Truncated {
                what: "read value",
                offset,
            });
        }
        let address = buf.get_u32_le();
        let size = usize::from(buf.get_u16_le());
        if buf.remaining() < size {
            return Err(PayloadError::Truncated {
                what: "read value",
                offset,
            });
        }
        values.push(MemValue::new(address, &buf[..size]));
        buf.advance(size);
    }
    if values.is_empty() {
        return Err(PayloadError::NoRecords { what: "read reply" });
    }
    Ok(values)
}

/// Text decoding of `address=value` pairs. Addresses may be `0x`-prefixed
/// hex or decimal. Pairs that do not parse are skipped; an empty payload is
/// an empty reply.
pub fn decode_read_reply_text(payload: &[u8]) -> Result<Vec<MemValue>> {
    let text = String::from_utf8_lossy(payload);
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let values: Vec<MemValue> = text
        .split(',')
        .filter_map(|pair| {
            let (address, value) = pair.split_once('=')?;
            let address = parse_address(address.trim())?;
            let value: f32 = value.trim().parse().ok()?;
            Some(MemValue::from_f32(address, value))
        })
        .collect();
    if values.is_empty() {
        return Err(PayloadError::NoRecords { what: "read reply" });
    }
    Ok(values)
}

/// Parse `0x`-prefixed hex or plain decimal.
pub fn parse_address(field: &str) -> Option<u32> {
    match field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => field.parse().ok(),
    }
}

/// Encode a write request: repeated `address: u32, size: u16, raw`.
pub fn encode_write_request(writes: &[MemValue]) -> Vec<u8> {
    let mut out = Vec::new();
    for write in writes {
        let raw = &write.raw[..write.raw.len().min(usize::from(u16::MAX))];
        if out.len() + READ_ENTRY_LEN + raw.len() > MAX_PAYLOAD {
            break;
        }
        out.put_u32_le(write.address);
        out.put_u16_le(raw.len() as u16);
        out.put_slice(raw);
    }
    out
}

/// Encode the older fixed layout: repeated `address: u32, value: f32`.
pub fn encode_write_request_legacy(writes: &[(u32, f32)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(writes.len() * LEGACY_WRITE_ENTRY_LEN);
    for (address, value) in writes.iter().take(MAX_PAYLOAD / LEGACY_WRITE_ENTRY_LEN) {
        out.put_u32_le(*address);
        out.put_f32_le(*value);
    }
    out
}

/// Decode a write request.
///
/// The sized layout is tried first and must consume the payload exactly;
/// only when it fails or yields nothing is the payload read as legacy
/// `address, f32` pairs. A legacy payload that happens to parse as a sized
/// one is taken as sized.
pub fn decode_write_request(payload: &[u8]) -> Vec<MemValue> {
    match decode_write_sized(payload) {
        Some(writes) if !writes.is_empty() => writes,
        _ => {
            let writes: Vec<MemValue> = payload
                .chunks_exact(LEGACY_WRITE_ENTRY_LEN)
                .map(|mut entry| MemValue::new(entry.get_u32_le(), &entry[..4]))
                .collect();
            if !writes.is_empty() {
                debug!(count = writes.len(), "write request decoded with legacy layout");
            }
            writes
        }
    }
}

fn decode_write_sized(payload: &[u8]) -> Option<Vec<MemValue>> {
    let mut buf = payload;
    let mut writes = Vec::new();
    while buf.remaining() >= READ_ENTRY_LEN {
        let address = buf.get_u32_le();
        let size = usize::from(buf.get_u16_le());
        if buf.remaining() < size {
            return None;
        }
        writes.push(MemValue::new(address, &buf[..size]));
        buf.advance(size);
    }
    if buf.has_remaining() {
        return None;
    }
    Some(writes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_request_layout() {
        let reads = [
            MemRead {
                address: 0x2000_1000,
                size: 4,
            },
            MemRead {
                address: 0x2000_1004,
                size: 2,
            },
        ];
        let payload = encode_read_request(&reads);
        assert_eq!(&payload[..6], &[0x00, 0x10, 0x00, 0x20, 0x04, 0x00]);

        let mut with_tail = payload.clone();
        with_tail.extend([0xFF, 0xFF]);
        assert_eq!(decode_read_request(&with_tail), reads);
    }

    #[test]
    fn binary_reply_roundtrip() {
        let values = vec![
            MemValue::typed(0x2000_1000, DataType::Float32, 42.5),
            MemValue::typed(0x2000_1004, DataType::Int16, -7.0),
            MemValue::typed(0x2000_1008, DataType::Float64, 1.5),
        ];
        let payload = encode_read_reply(&values, WireFormat::Binary);
        assert_eq!(decode_read_reply(&payload), Decoded::Binary(values));
    }

    #[test]
    fn text_reply_format() {
        let values = vec![
            MemValue::from_f32(0x2000_1000, 42.5),
            MemValue::from_f32(0x2000_1004, 24.2),
        ];
        let payload = encode_read_reply(&values, WireFormat::Text);
        assert_eq!(
            std::str::from_utf8(&payload).unwrap(),
            "0x20001000=42.500000,0x20001004=24.200001"
        );
        match decode_read_reply(&payload) {
            Decoded::Text(decoded) => {
                assert_eq!(decoded[0], values[0]);
                assert!((decoded[1].value().unwrap() - 24.2).abs() < 1e-4);
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn text_reply_accepts_decimal_addresses_and_whitespace() {
        let values = decode_read_reply_text(b" 536875008 = 1.5 , 0x10=2,junk, 0x20=x").unwrap();
        assert_eq!(
            values,
            vec![MemValue::from_f32(0x2000_1000, 1.5), MemValue::from_f32(0x10, 2.0)]
        );
    }

    #[test]
    fn unparsable_reply_is_unknown() {
        assert!(decode_read_reply(b"hello world").is_unknown());
        assert_eq!(decode_read_reply(b""), Decoded::Text(vec![]));
    }

    #[test]
    fn sized_write_roundtrip() {
        let writes = vec![
            MemValue::typed(0x2000_1000, DataType::UInt8, 200.0),
            MemValue::typed(0x2000_1004, DataType::Float64, -3.25),
        ];
        assert_eq!(decode_write_request(&encode_write_request(&writes)), writes);
    }

    #[test]
    fn legacy_write_fallback() {
        let payload = encode_write_request_legacy(&[(0x2000_1000, 42.5), (0x2000_1004, 1.0)]);
        let writes = decode_write_request(&payload);
        assert_eq!(
            writes,
            vec![
                MemValue::from_f32(0x2000_1000, 42.5),
                MemValue::from_f32(0x2000_1004, 1.0)
            ]
        );
    }

    #[test]
    fn single_legacy_write_is_not_misread() {
        // The value's low half reads as size 0, leaving two stray bytes.
        let payload = encode_write_request_legacy(&[(0x2000_1000, 42.5)]);
        assert_eq!(
            decode_write_request(&payload),
            vec![MemValue::from_f32(0x2000_1000, 42.5)]
        );
    }

    #[test]
    fn legacy_payload_that_parses_as_sized_stays_sized() {
        // address 1, value whose low half reads as size 2: 6 + 2 bytes consumed exactly.
        let mut payload = Vec::new();
        payload.put_u32_le(1);
        payload.put_slice(&[0x02, 0x00, 0xAB, 0xCD]);
        let writes = decode_write_request(&payload);
        assert_eq!(writes, vec![MemValue::new(1, vec![0xAB, 0xCD])]);
    }

    #[test]
    fn empty_write_request() {
        assert!(decode_write_request(&[]).is_empty());
        assert!(decode_write_request(&[1, 2, 3]).is_empty());
    }
}
