/// Decode a raw memory value whose type is unknown, choosing the width from
/// the number of bytes available.
///
/// | bytes | read as |
/// |-------|---------|
/// | ≥ 8   | f64     |
/// | ≥ 4   | f32     |
/// | ≥ 2   | i16     |
/// | 1     | i8      |
/// | 0     | `None`  |
pub fn decode_numeric(raw: &[u8]) -> Option<f64> {
    match raw.len() {
        0 => None,
        1 => Some(f64::from(raw[0] as i8)),
        2 | 3 => Some(f64::from(i16::from_le_bytes([raw[0], raw[1]]))),
        4..=7 => Some(f64::from(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))),
        _ => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&raw[..8]);
            Some(f64::from_le_bytes(bytes))
        }
    }
}
