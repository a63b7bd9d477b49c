use std::time::Duration;

/// Errors that can occur in request/response exchanges.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] linkprobe_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] linkprobe_frame::FrameError),

    /// A payload that a strict decoder rejected.
    #[error("payload error: {0}")]
    Payload(#[from] linkprobe_payload::PayloadError),

    /// No matching response before the deadline.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The device answered with an acknowledgment that does not confirm the
    /// request.
    #[error(
        "request rejected: status {status}, ack for command 0x{for_command:02X} sequence {for_sequence}"
    )]
    Rejected {
        status: u8,
        for_command: u8,
        for_sequence: u16,
    },

    /// The request frame was suppressed by fault injection.
    #[error("request not sent (dropped)")]
    NotSent,

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PeerError>;
