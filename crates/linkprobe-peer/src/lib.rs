//! Both ends of the linkprobe command protocol.
//!
//! The requester side is [`Client`], which issues one request at a time and
//! waits for the correlated response under a deadline. [`ComplianceHarness`]
//! drives a fixed scenario through a client and scores it. The responder side
//! is [`Simulator`], a software device that answers every command from a
//! [`VariableRegistry`] and streams paced samples alongside.

pub mod client;
pub mod correlation;
pub mod device;
pub mod error;
pub mod harness;
pub mod registry;
pub mod sequence;
pub mod streaming;

pub use client::{Client, ClientConfig};
pub use correlation::{correlate, Correlation, Issued};
pub use device::{Reply, Simulator, SimulatorConfig, SimulatorHandle, SimulatorStats};
pub use error::{PeerError, Result};
pub use harness::{ComplianceHarness, ComplianceReport, HarnessConfig, LinkCounters, StepResult};
#[cfg(feature = "async")]
pub use linkprobe_frame::LinkCodec;
pub use registry::{default_variables, VariableRegistry};
pub use sequence::SequenceCounter;
pub use streaming::{synth_sample, synth_value, StreamCapture, StreamMode, StreamPacer};
