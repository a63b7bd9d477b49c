//! `GET_VAR_TABLE` reply payloads.
//!
//! Binary layout: `count: u16` then per variable
//! `address: u32, type: u8, array_size: u16, scale: f32, unit_len: u8,
//! name_len: u8, unit, name`.
//!
//! Text layout: `;`-separated records of
//! `name,0xADDRESS,type,scale,unit[,array_size]`.

use bytes::{Buf, BufMut};
use tracing::debug;

use crate::error::{PayloadError, Result};
use crate::types::{DataType, Decoded, VariableDescriptor, WireFormat};
use crate::MAX_PAYLOAD;

const MAX_NAME_LEN: usize = 64;
const MAX_UNIT_LEN: usize = 16;
const ITEM_FIXED_LEN: usize = 4 + 1 + 2 + 4 + 1 + 1;
const TEXT_MIN_FIELDS: usize = 5;

/// Encode in the requested format.
pub fn encode(vars: &[VariableDescriptor], format: WireFormat) -> Vec<u8> {
    match format {
        WireFormat::Text => encode_text(vars),
        WireFormat::Binary => encode_binary(vars),
    }
}

/// Binary encoding. Names and units are cut to 64 and 16 bytes; variables
/// that would push the payload past 1024 bytes are left out and the count
/// reflects only what was written.
pub fn encode_binary(vars: &[VariableDescriptor]) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAX_PAYLOAD);
    out.put_u16_le(0);
    let mut count = 0u16;
    for var in vars {
        let name = ascii_field(&var.name, MAX_NAME_LEN);
        let unit = ascii_field(&var.unit, MAX_UNIT_LEN);
        if out.len() + ITEM_FIXED_LEN + name.len() + unit.len() > MAX_PAYLOAD {
            break;
        }
        out.put_u32_le(var.address);
        out.put_u8(var.data_type.code());
        out.put_u16_le(var.array_size);
        out.put_f32_le(var.scale);
        out.put_u8(unit.len() as u8);
        out.put_u8(name.len() as u8);
        out.put_slice(&unit);
        out.put_slice(&name);
        count += 1;
    }
    out[..2].copy_from_slice(&count.to_le_bytes());
    out
}

/// Text encoding. Only whole records are emitted; the first record that
/// would exceed 1024 bytes ends the table.
pub fn encode_text(vars: &[VariableDescriptor]) -> Vec<u8> {
    let mut out = String::new();
    for var in vars {
        let mut record = format!(
            "{},0x{:08X},{},{},{}",
            text_field(&var.name),
            var.address,
            var.data_type,
            var.scale,
            text_field(&var.unit)
        );
        if var.array_size != 1 {
            record.push_str(&format!(",{}", var.array_size));
        }
        let sep = usize::from(!out.is_empty());
        if out.len() + sep + record.len() > MAX_PAYLOAD {
            break;
        }
        if sep == 1 {
            out.push(';');
        }
        out.push_str(&record);
    }
    out.into_bytes()
}

fn ascii_field(s: &str, max: usize) -> Vec<u8> {
    s.bytes().filter(u8::is_ascii).take(max).collect()
}

fn text_field(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii() && *c != ',' && *c != ';')
        .collect()
}

/// Try binary, then text.
pub fn decode(payload: &[u8]) -> Decoded<VariableDescriptor> {
    match decode_binary(payload) {
        Ok(vars) => return Decoded::Binary(vars),
        Err(err) => debug!(%err, "variable table is not binary, trying text"),
    }
    match decode_text(payload) {
        Ok(vars) => Decoded::Text(vars),
        Err(err) => {
            debug!(%err, "variable table is not text either");
            Decoded::Unknown
        }
    }
}

/// Strict binary decoding. Fails on truncation, an unknown type code or an
/// empty table.
pub fn decode_binary(payload: &[u8]) -> Result<Vec<VariableDescriptor>> {
    let mut buf = payload;
    if buf.remaining() < 2 {
        return Err(PayloadError::Truncated {
            what: "variable table",
            offset: 0,
        });
    }
    let count = buf.get_u16_le();
    let mut vars = Vec::with_capacity(usize::from(count).min(MAX_PAYLOAD / ITEM_FIXED_LEN));
    for _ in 0..count {
        let offset = payload.len() - buf.remaining();
        let truncated = PayloadError::Truncated {
            what: "variable descriptor",
            offset,
        };
        if buf.remaining() < ITEM_FIXED_LEN {
            return Err(truncated);
        }
        let address = buf.get_u32_le();
        let code = buf.get_u8();
        let array_size = buf.get_u16_le();
        let scale = buf.get_f32_le();
        let unit_len = usize::from(buf.get_u8());
        let name_len = usize::from(buf.get_u8());
        if buf.remaining() < unit_len + name_len {
            return Err(truncated);
        }
        let data_type = DataType::from_code(code).ok_or(PayloadError::UnknownDataType(code))?;
        let unit = String::from_utf8_lossy(&buf[..unit_len]).into_owned();
        buf.advance(unit_len);
        let name = String::from_utf8_lossy(&buf[..name_len]).into_owned();
        buf.advance(name_len);
        vars.push(VariableDescriptor {
            name,
            address,
            data_type,
            scale,
            unit,
            array_size,
        });
    }
    if vars.is_empty() {
        return Err(PayloadError::NoRecords {
            what: "variable table",
        });
    }
    Ok(vars)
}

/// Text decoding. Whitespace around fields is ignored, records with fewer
/// than five fields or an unparsable address are skipped. An empty (or
/// all-whitespace) payload is an empty table.
pub fn decode_text(payload: &[u8]) -> Result<Vec<VariableDescriptor>> {
    let text = String::from_utf8_lossy(payload);
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let vars: Vec<VariableDescriptor> = text.split(';').filter_map(parse_record).collect();
    if vars.is_empty() {
        return Err(PayloadError::NoRecords {
            what: "variable table",
        });
    }
    Ok(vars)
}

fn parse_record(record: &str) -> Option<VariableDescriptor> {
    let fields: Vec<&str> = record.split(',').map(str::trim).collect();
    if fields.len() < TEXT_MIN_FIELDS || fields[0].is_empty() {
        return None;
    }
    let address = parse_hex_u32(fields[1])?;
    Some(VariableDescriptor {
        name: fields[0].to_string(),
        address,
        data_type: DataType::parse_lenient(fields[2]),
        scale: fields[3].parse().unwrap_or(1.0),
        unit: fields[4].to_string(),
        array_size: fields
            .get(5)
            .and_then(|f| f.parse().ok())
            .unwrap_or(1),
    })
}

fn parse_hex_u32(field: &str) -> Option<u32> {
    let digits = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
        .unwrap_or(field);
    u32::from_str_radix(digits, 16).ok()
}
