use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PayloadError;

/// Storage type of a device variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DataType {
    Int8 = 0,
    UInt8 = 1,
    Int16 = 2,
    UInt16 = 3,
    Int32 = 4,
    UInt32 = 5,
    Float32 = 6,
    Float64 = 7,
}

impl DataType {
    pub const ALL: [DataType; 8] = [
        DataType::Int8,
        DataType::UInt8,
        DataType::Int16,
        DataType::UInt16,
        DataType::Int32,
        DataType::UInt32,
        DataType::Float32,
        DataType::Float64,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    /// Lower-case name used in text variable tables.
    pub const fn name(self) -> &'static str {
        match self {
            DataType::Int8 => "int8",
            DataType::UInt8 => "uint8",
            DataType::Int16 => "int16",
            DataType::UInt16 => "uint16",
            DataType::Int32 => "int32",
            DataType::UInt32 => "uint32",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }

    /// Natural width in bytes.
    pub const fn width(self) -> usize {
        match self {
            DataType::Int8 | DataType::UInt8 => 1,
            DataType::Int16 | DataType::UInt16 => 2,
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => 4,
            DataType::Float64 => 8,
        }
    }

    /// Parse a text-table type field. Unrecognized names map to `Float32`.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(DataType::Float32)
    }

    /// Encode `value` little-endian at this type's width.
    ///
    /// Integer types truncate toward zero and wrap into range.
    pub fn encode_value(self, value: f64) -> Vec<u8> {
        let whole = value as i64;
        match self {
            DataType::Int8 => (whole as i8).to_le_bytes().to_vec(),
            DataType::UInt8 => (whole as u8).to_le_bytes().to_vec(),
            DataType::Int16 => (whole as i16).to_le_bytes().to_vec(),
            DataType::UInt16 => (whole as u16).to_le_bytes().to_vec(),
            DataType::Int32 => (whole as i32).to_le_bytes().to_vec(),
            DataType::UInt32 => (whole as u32).to_le_bytes().to_vec(),
            DataType::Float32 => (value as f32).to_le_bytes().to_vec(),
            DataType::Float64 => value.to_le_bytes().to_vec(),
        }
    }

    /// Decode a little-endian value of this type from the front of `raw`.
    ///
    /// `None` when `raw` is shorter than [`width`](Self::width).
    pub fn decode_value(self, raw: &[u8]) -> Option<f64> {
        let bytes = raw.get(..self.width())?;
        Some(match self {
            DataType::Int8 => f64::from(bytes[0] as i8),
            DataType::UInt8 => f64::from(bytes[0]),
            DataType::Int16 => f64::from(i16::from_le_bytes([bytes[0], bytes[1]])),
            DataType::UInt16 => f64::from(u16::from_le_bytes([bytes[0], bytes[1]])),
            DataType::Int32 => f64::from(i32::from_le_bytes(bytes.try_into().ok()?)),
            DataType::UInt32 => f64::from(u32::from_le_bytes(bytes.try_into().ok()?)),
            DataType::Float32 => f64::from(f32::from_le_bytes(bytes.try_into().ok()?)),
            DataType::Float64 => f64::from_le_bytes(bytes.try_into().ok()?),
        })
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = PayloadError;

    /// Accepts the lower-case names (any case), the numeric code, and the
    /// `float`/`double` aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if let Some(found) = Self::ALL.iter().find(|t| t.name() == lower) {
            return Ok(*found);
        }
        match lower.as_str() {
            "float" => Ok(DataType::Float32),
            "double" => Ok(DataType::Float64),
            other => other
                .parse::<u8>()
                .ok()
                .and_then(DataType::from_code)
                .ok_or_else(|| PayloadError::InvalidField {
                    what: "data type",
                    value: s.to_string(),
                }),
        }
    }
}

/// Metadata for one named device variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub name: String,
    pub address: u32,
    pub data_type: DataType,
    pub scale: f32,
    pub unit: String,
    /// Element count; 1 for scalars.
    pub array_size: u16,
}

impl VariableDescriptor {
    /// A scalar with unit scale and no unit.
    pub fn new(name: impl Into<String>, address: u32, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            address,
            data_type,
            scale: 1.0,
            unit: String::new(),
            array_size: 1,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Wire encoding selected for a data kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Text,
    Binary,
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WireFormat::Text => "text",
            WireFormat::Binary => "binary",
        })
    }
}

/// Result of permissive decoding: which format matched, or neither.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Binary(Vec<T>),
    Text(Vec<T>),
    Unknown,
}

impl<T> Decoded<T> {
    /// Decoded items; empty for `Unknown`.
    pub fn items(&self) -> &[T] {
        match self {
            Decoded::Binary(items) | Decoded::Text(items) => items,
            Decoded::Unknown => &[],
        }
    }

    pub fn into_items(self) -> Vec<T> {
        match self {
            Decoded::Binary(items) | Decoded::Text(items) => items,
            Decoded::Unknown => Vec::new(),
        }
    }

    pub fn format(&self) -> Option<WireFormat> {
        match self {
            Decoded::Binary(_) => Some(WireFormat::Binary),
            Decoded::Text(_) => Some(WireFormat::Text),
            Decoded::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Decoded::Unknown)
    }
}
