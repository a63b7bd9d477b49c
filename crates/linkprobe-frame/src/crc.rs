//! CRC-16/CCITT-FALSE: polynomial 0x1021, init 0xFFFF, MSB-first, no reflection,
//! no final XOR.

const POLY: u16 = 0x1021;
const INIT: u16 = 0xFFFF;

/// Compute the frame CRC over `bytes`.
pub fn crc16_ccitt_false(bytes: &[u8]) -> u16 {
    let mut crc = INIT;
    for &b in bytes {
        crc ^= u16::from(b) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ POLY;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        assert_eq!(crc16_ccitt_false(b"123456789"), 0x29B1);
    }

    #[test]
    fn empty_input_is_init() {
        assert_eq!(crc16_ccitt_false(&[]), 0xFFFF);
    }

    #[test]
    fn single_byte_change_is_detected() {
        let original = [0x01, 0x01, 0x07, 0x00, 0x00, 0x00];
        let mut flipped = original;
        flipped[2] ^= 0x01;
        assert_ne!(crc16_ccitt_false(&original), crc16_ccitt_false(&flipped));
    }
}
