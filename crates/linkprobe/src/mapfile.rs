//! Variable tables from linker map files.
//!
//! A data symbol appears as an indented symbol line followed, somewhere
//! below, by an indented `ADDRESS SIZE data ,g` line:
//!
//! ```text
//!   _g_motor_speed
//!                                   20001000  00000004   data ,g         *
//! ```

use std::io;
use std::path::Path;
use std::sync::OnceLock;

use linkprobe_payload::{DataType, VariableDescriptor};
use regex::Regex;

/// An indented line holding only an underscore-prefixed symbol.
const SYMBOL_LINE: &str = r"^\s+(_[A-Za-z0-9_$.@]+)\s*$";
/// An indented `ADDRESS SIZE data ,g` line.
const DATA_LINE: &str = r"^\s+([0-9A-Fa-f]{8})\s+([0-9A-Fa-f]+)\s+data\s*,g";

static LINE_PATTERNS: OnceLock<Result<LinePatterns, regex::Error>> = OnceLock::new();

struct LinePatterns {
    symbol: Regex,
    data: Regex,
}

impl LinePatterns {
    fn get() -> io::Result<&'static Self> {
        let compiled = LINE_PATTERNS.get_or_init(|| {
            Ok(Self {
                symbol: Regex::new(SYMBOL_LINE)?,
                data: Regex::new(DATA_LINE)?,
            })
        });
        compiled
            .as_ref()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.clone()))
    }

    fn symbol<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.symbol
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Returns the address of a global data line.
    fn data(&self, line: &str) -> Option<u32> {
        let caps = self.data.captures(line)?;
        u32::from_str_radix(caps.get(1)?.as_str(), 16).ok()
    }
}

/// Which map symbols become variables.
#[derive(Debug, Clone)]
pub struct MapFilter {
    /// Accepted name prefixes, compared case-insensitively. Empty accepts all.
    pub prefixes: Vec<String>,
    pub min_address: u32,
    pub max_vars: usize,
}

impl Default for MapFilter {
    fn default() -> Self {
        Self {
            prefixes: vec!["g_".into(), "com_".into(), "gui_".into()],
            min_address: 0x1000,
            max_vars: 48,
        }
    }
}

impl MapFilter {
    /// Parse a comma-separated prefix list.
    pub fn with_prefix_list(mut self, list: &str) -> Self {
        self.prefixes = list
            .split(',')
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        self
    }

    fn accepts(&self, name: &str, address: u32) -> bool {
        let lower = name.to_ascii_lowercase();
        if !self.prefixes.is_empty()
            && !self.prefixes.iter().any(|p| lower.starts_with(p.as_str()))
        {
            return false;
        }
        address >= self.min_address && !lower.contains("table") && !lower.contains("vect")
    }
}

/// Read and parse a map file. Non-UTF-8 bytes are replaced; only ASCII
/// symbol and address lines matter.
pub fn load(path: &Path, filter: &MapFilter) -> io::Result<Vec<VariableDescriptor>> {
    let bytes = std::fs::read(path)?;
    parse(&String::from_utf8_lossy(&bytes), filter)
}

/// Extract variables from map text.
pub fn parse(text: &str, filter: &MapFilter) -> io::Result<Vec<VariableDescriptor>> {
    let patterns = LinePatterns::get()?;
    let mut vars = Vec::new();
    let mut pending: Option<&str> = None;

    for line in text.lines() {
        if let Some(symbol) = patterns.symbol(line) {
            pending = Some(symbol);
            continue;
        }
        let Some(symbol) = pending else {
            continue;
        };
        let Some(address) = patterns.data(line) else {
            continue;
        };
        pending = None;

        let name = symbol.trim_start_matches('_');
        if !filter.accepts(name, address) {
            continue;
        }
        vars.push(
            VariableDescriptor::new(name, address, infer_data_type(name))
                .with_unit(infer_unit(name)),
        );
        if vars.len() >= filter.max_vars {
            break;
        }
    }
    Ok(vars)
}

/// Data type from naming conventions: `u1_`, `s2_`, `f8_` markers as a
/// prefix or `_x_` infix, `double` anywhere; everything else is `float32`.
pub fn infer_data_type(name: &str) -> DataType {
    let lower = name.to_ascii_lowercase();
    let marked =
        |tag: &str| lower.contains(&format!("_{tag}_")) || lower.starts_with(&format!("{tag}_"));
    const MARKERS: [(&str, DataType); 6] = [
        ("u1", DataType::UInt8),
        ("u2", DataType::UInt16),
        ("u4", DataType::UInt32),
        ("s1", DataType::Int8),
        ("s2", DataType::Int16),
        ("s4", DataType::Int32),
    ];
    for (tag, data_type) in MARKERS {
        if marked(tag) {
            return data_type;
        }
    }
    if lower.contains("_f8_") || lower.contains("double") {
        DataType::Float64
    } else {
        DataType::Float32
    }
}

pub fn infer_unit(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.contains("speed") {
        "rpm"
    } else if lower.contains("temp") {
        "C"
    } else if lower.contains("volt") {
        "V"
    } else if lower.contains("curr") {
        "A"
    } else {
        "raw"
    }
}
