//! Device simulator and compliance harness for a CRC-framed serial command
//! protocol.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte links (Unix sockets standing in for a serial port)
//! - [`frame`]: CRC-16 framing with single-byte resynchronization
//! - [`payload`]: binary and text payload codecs
//! - [`peer`]: request client, device simulator, compliance harness
//! - [`mapfile`]: variable tables imported from linker map files

pub mod mapfile;

/// Re-export transport types.
pub mod transport {
    pub use linkprobe_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use linkprobe_frame::*;
}

/// Re-export payload codecs.
pub mod payload {
    pub use linkprobe_payload::*;
}

/// Re-export peer types.
pub mod peer {
    pub use linkprobe_peer::*;
}
