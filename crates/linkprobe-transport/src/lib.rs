//! Byte-channel abstraction for the linkprobe frame protocol.
//!
//! The protocol engine only needs a byte channel with short-timeout reads and
//! best-effort writes. On a bench that is a serial port; here the channel is a
//! Unix domain socket (or an in-process socket pair), which behaves the same
//! way once a read timeout is applied:
//! - reads return whatever bytes are available, or time out
//! - writes may fail or block under back-pressure
//!
//! Everything else in linkprobe builds on the [`LinkStream`] type provided here.

pub mod error;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use stream::{is_timeout, LinkStream};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
