//! Probabilistic link faults for outbound frames.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::codec::{CRC_SIZE, SOF};

/// Fault rates applied to every outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FaultConfig {
    /// Probability that a frame is silently not transmitted.
    pub drop_rate: f64,
    /// Probability that one byte of a transmitted frame is flipped.
    pub crc_error_rate: f64,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl FaultConfig {
    /// Rates clamped into `[0, 1]`; NaN counts as zero.
    pub fn clamped(self) -> Self {
        Self {
            drop_rate: clamp_rate(self.drop_rate),
            crc_error_rate: clamp_rate(self.crc_error_rate),
            seed: self.seed,
        }
    }

    pub fn is_active(&self) -> bool {
        self.drop_rate > 0.0 || self.crc_error_rate > 0.0
    }
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        0.0
    } else {
        rate.clamp(0.0, 1.0)
    }
}

/// What the injector did to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    Clean,
    Dropped,
    /// One bit flipped at `offset` into the encoded frame.
    Corrupted { offset: usize },
}

/// Applies [`FaultConfig`] to encoded frames.
#[derive(Debug)]
pub struct FaultInjector {
    config: FaultConfig,
    rng: StdRng,
}

impl FaultInjector {
    pub fn new(config: FaultConfig) -> Self {
        let config = config.clamped();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }

    pub fn config(&self) -> &FaultConfig {
        &self.config
    }

    /// Roll the drop dice once.
    pub fn should_drop(&mut self) -> bool {
        self.config.drop_rate > 0.0 && self.rng.gen_bool(self.config.drop_rate)
    }

    /// Decide the fate of one encoded frame, flipping a byte in place if it
    /// is to be corrupted.
    ///
    /// Corruption never touches the start marker or the trailing CRC, so the
    /// receiver always sees a marker followed by a header or payload that no
    /// longer matches its checksum.
    pub fn apply(&mut self, frame: &mut [u8]) -> FaultOutcome {
        if self.should_drop() {
            return FaultOutcome::Dropped;
        }

        let first = SOF.len();
        let end = frame.len().saturating_sub(CRC_SIZE);
        if self.config.crc_error_rate > 0.0
            && end > first
            && self.rng.gen_bool(self.config.crc_error_rate)
        {
            let offset = self.rng.gen_range(first..end);
            frame[offset] ^= 0x01;
            return FaultOutcome::Corrupted { offset };
        }

        FaultOutcome::Clean
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::codec::{encode_frame, FrameDecoder};

    fn frame() -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(0x20, 1, &[0u8; 32], &mut buf);
        buf.to_vec()
    }

    #[test]
    fn inactive_injector_is_clean() {
        let mut injector = FaultInjector::new(FaultConfig::default());
        let mut bytes = frame();
        let original = bytes.clone();
        for _ in 0..100 {
            assert_eq!(injector.apply(&mut bytes), FaultOutcome::Clean);
        }
        assert_eq!(bytes, original);
    }

    #[test]
    fn full_drop_rate_drops_everything() {
        let mut injector = FaultInjector::new(FaultConfig {
            drop_rate: 1.0,
            crc_error_rate: 1.0,
            seed: Some(1),
        });
        let mut bytes = frame();
        assert_eq!(injector.apply(&mut bytes), FaultOutcome::Dropped);
        assert_eq!(bytes, frame());
    }

    #[test]
    fn corruption_skips_marker_and_crc_and_is_detected() {
        let mut injector = FaultInjector::new(FaultConfig {
            drop_rate: 0.0,
            crc_error_rate: 1.0,
            seed: Some(7),
        });
        for _ in 0..200 {
            let mut bytes = frame();
            match injector.apply(&mut bytes) {
                FaultOutcome::Corrupted { offset } => {
                    assert!(offset >= SOF.len());
                    assert!(offset < bytes.len() - CRC_SIZE);
                    assert_eq!(&bytes[..2], &SOF);
                }
                other => panic!("expected corruption, got {other:?}"),
            }
            let mut decoder = FrameDecoder::new();
            decoder.feed(&bytes);
            assert!(decoder.next_frame().is_none());
        }
    }

    #[test]
    fn seeded_injectors_agree() {
        let config = FaultConfig {
            drop_rate: 0.3,
            crc_error_rate: 0.3,
            seed: Some(42),
        };
        let mut a = FaultInjector::new(config);
        let mut b = FaultInjector::new(config);
        for _ in 0..500 {
            let (mut x, mut y) = (frame(), frame());
            assert_eq!(a.apply(&mut x), b.apply(&mut y));
        }
    }

    #[test]
    fn drop_rate_is_roughly_honored() {
        let mut injector = FaultInjector::new(FaultConfig {
            drop_rate: 0.25,
            crc_error_rate: 0.0,
            seed: Some(3),
        });
        let dropped = (0..4000)
            .filter(|_| injector.apply(&mut frame()) == FaultOutcome::Dropped)
            .count();
        assert!((800..1200).contains(&dropped), "dropped {dropped}");
    }

    #[test]
    fn rates_are_clamped() {
        let config = FaultConfig {
            drop_rate: 3.0,
            crc_error_rate: f64::NAN,
            seed: None,
        }
        .clamped();
        assert_eq!(config.drop_rate, 1.0);
        assert_eq!(config.crc_error_rate, 0.0);
        assert!(config.is_active());
    }
}
