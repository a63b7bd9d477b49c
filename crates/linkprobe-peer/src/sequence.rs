use std::sync::atomic::{AtomicU16, Ordering};

/// Per-originator 16-bit sequence numbers, starting at 1 and wrapping.
#[derive(Debug)]
pub struct SequenceCounter(AtomicU16);

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u16) -> Self {
        Self(AtomicU16::new(first))
    }

    /// Take the next sequence number.
    pub fn next(&self) -> u16 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// The value the next call to [`next`](Self::next) returns.
    pub fn peek(&self) -> u16 {
        self.0.load(Ordering::Relaxed)
    }
}
