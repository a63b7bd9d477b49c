//! Periodic stream production and capture accounting.

use std::f64::consts::TAU;
use std::time::{Duration, Instant};

use serde::Serialize;

/// How the simulator emits stream samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// `STREAM_DATA` frames.
    #[default]
    Binary,
    /// Bare CSV lines, one per sample, outside any frame.
    Csv,
}

/// Drift-free fixed-rate scheduler.
///
/// Each deadline is the previous deadline plus one period, so sleep jitter
/// does not accumulate. When the caller falls more than one period behind,
/// the schedule restarts from the current instant instead of bursting to
/// catch up.
#[derive(Debug)]
pub struct StreamPacer {
    period: Duration,
    deadline: Instant,
    resets: u64,
}

impl StreamPacer {
    pub fn new(rate_hz: u16) -> Self {
        Self::starting_at(rate_hz, Instant::now())
    }

    pub fn starting_at(rate_hz: u16, now: Instant) -> Self {
        Self {
            period: period_for(rate_hz),
            deadline: now,
            resets: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Times the schedule was abandoned because the caller fell behind.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    /// Change the rate, restarting the schedule at `now`.
    pub fn set_rate(&mut self, rate_hz: u16, now: Instant) {
        self.period = period_for(rate_hz);
        self.deadline = now;
    }

    /// Advance to the next deadline and return how long to sleep from `now`.
    pub fn advance(&mut self, now: Instant) -> Duration {
        self.deadline += self.period;
        if now > self.deadline + self.period {
            self.deadline = now;
            self.resets += 1;
            return Duration::ZERO;
        }
        self.deadline.saturating_duration_since(now)
    }

    /// Advance and sleep until the next deadline.
    pub fn wait(&mut self) {
        let sleep = self.advance(Instant::now());
        if !sleep.is_zero() {
            std::thread::sleep(sleep);
        }
    }
}

fn period_for(rate_hz: u16) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(rate_hz.max(1)))
}

/// Synthetic sample for `channel` at `t` seconds: a per-channel sine with a
/// slow modulation and a small per-channel offset.
pub fn synth_value(t: f64, channel: usize) -> f32 {
    let ch = channel as f64;
    let base = (TAU * (0.8 + ch * 0.11) * t).sin();
    let modulation = 0.35 * (TAU * 0.07 * t + ch * 0.2).sin();
    (0.7 * base + modulation + ch * 0.03) as f32
}

/// One sample across `channels` channels.
pub fn synth_sample(t: f64, channels: usize) -> Vec<f32> {
    (0..channels).map(|ch| synth_value(t, ch)).collect()
}

/// What a capture window saw.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamCapture {
    /// Stream frames whose length implies a whole channel count.
    pub frames: u64,
    /// Channel count of the last counted frame.
    pub last_channels: usize,
    /// Stream frames rejected for an uneven payload length.
    pub rejected: u64,
    /// Frames on other command codes received during the window.
    pub other_frames: u64,
    #[serde(serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl StreamCapture {
    /// Frames per second over the window.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}
