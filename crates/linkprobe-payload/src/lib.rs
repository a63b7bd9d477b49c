//! Payload codecs for the linkprobe command set.
//!
//! Every data-carrying command has two wire encodings, a compact binary one
//! and a human-readable text one. Encoders emit exactly the format they are
//! asked for; decoders try binary first and fall back to text, reporting which
//! one matched through [`Decoded`].
//!
//! Modules map to commands:
//! - [`vartable`]: `GET_VAR_TABLE` replies
//! - [`memory`]: `READ_MEM_BATCH` requests and replies, `WRITE_MEM` requests
//! - [`stream`]: `STREAM_DATA` samples and CSV stream lines
//! - [`control`]: `ACK` and `SET_STREAM_CONFIG` payloads
//! - [`numeric`]: width-driven decoding of raw memory values

pub mod control;
pub mod error;
pub mod memory;
pub mod numeric;
pub mod stream;
pub mod types;
pub mod vartable;

pub use control::{Ack, AckPayload, StreamConfig, ACK_FIELDS_LEN};
pub use error::{PayloadError, Result};
pub use memory::{MemRead, MemValue};
pub use numeric::decode_numeric;
pub use stream::{ChannelValue, StreamSample};
pub use types::{DataType, Decoded, VariableDescriptor, WireFormat};

/// Largest payload a frame carries; encoders never produce more.
pub const MAX_PAYLOAD: usize = 1024;
