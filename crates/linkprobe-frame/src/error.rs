/// Errors that can occur while moving frames over a link.
///
/// Corrupted input is not an error: the decoder drops it and counts it in
/// [`DecodeStats`](crate::DecodeStats).
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link reached end-of-stream.
    #[error("link closed")]
    ConnectionClosed,

    /// A command byte that is not part of the command set.
    #[error("unknown command code 0x{0:02X}")]
    UnknownCommand(u8),
}

pub type Result<T> = std::result::Result<T, FrameError>;
