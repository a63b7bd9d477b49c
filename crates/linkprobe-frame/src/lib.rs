//! CRC-checked frame codec for the linkprobe serial protocol.
//!
//! Every message on the wire is one frame:
//! - a 2-byte start marker (`0xAA 0x55`) for stream synchronization
//! - a version byte (always 1), a command byte, a 2-byte little-endian sequence
//! - a 2-byte little-endian payload length (at most 1024)
//! - the payload
//! - a 2-byte little-endian CRC-16/CCITT-FALSE over everything between the
//!   start marker and the CRC
//!
//! The decoder is stateful and tolerant: it accepts bytes in arbitrary chunks,
//! skips garbage, and recovers from corrupted frames one byte at a time.

pub mod codec;
#[cfg(feature = "async")]
pub mod codec_async;
pub mod command;
pub mod crc;
pub mod error;
pub mod fault;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, DecodeStats, Frame, FrameDecoder, CRC_SIZE, HEADER_SIZE,
    MAX_PAYLOAD, MIN_FRAME_SIZE, PROTOCOL_VERSION, SOF,
};
#[cfg(feature = "async")]
pub use codec_async::LinkCodec;
pub use command::{command_name, CommandId};
pub use crc::crc16_ccitt_false;
pub use error::{FrameError, Result};
pub use fault::{FaultConfig, FaultInjector, FaultOutcome};
pub use reader::FrameReader;
pub use writer::{FrameWriter, SendOutcome, TxStats};
