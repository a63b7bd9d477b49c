//! Matching received frames against an outstanding request.

use linkprobe_frame::{CommandId, Frame};
use linkprobe_payload::AckPayload;

/// A request waiting for its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Issued {
    pub command: CommandId,
    pub sequence: u16,
}

impl Issued {
    pub fn new(command: CommandId, sequence: u16) -> Self {
        Self { command, sequence }
    }
}

/// How a received frame relates to an [`Issued`] request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    /// Unrelated traffic; keep waiting.
    NotAMatch,
    /// The response that completes the request.
    Accepted,
    /// An acknowledgment that answers but does not confirm the request.
    Rejected {
        status: u8,
        for_command: u8,
        for_sequence: u16,
    },
}

/// Classify `frame` as a response to `issued`.
///
/// Requests that reply in kind (`GET_VAR_TABLE`, `READ_MEM_BATCH`) are
/// completed by a frame on their own command code. All other requests are
/// completed by an `ACK`:
/// - an ack too short to carry fields is accepted as is
/// - a structured ack must have status 0 and name the issued command and
///   sequence; any other structured ack rejects the request
///
/// A structured ack that names a reply-in-kind request exactly with a
/// non-zero status also rejects it. Every other frame is not a match.
pub fn correlate(issued: &Issued, frame: &Frame) -> Correlation {
    let is_ack = frame.is(CommandId::Ack);

    if issued.command.replies_in_kind() {
        if frame.command == issued.command.code() {
            return Correlation::Accepted;
        }
        if is_ack {
            if let AckPayload::Structured(ack) = AckPayload::parse(&frame.payload) {
                if !ack.is_ok()
                    && ack.for_command == issued.command.code()
                    && ack.for_sequence == issued.sequence
                {
                    return rejected(ack.status, ack.for_command, ack.for_sequence);
                }
            }
        }
        return Correlation::NotAMatch;
    }

    if !is_ack {
        return Correlation::NotAMatch;
    }
    match AckPayload::parse(&frame.payload) {
        AckPayload::Legacy => Correlation::Accepted,
        AckPayload::Structured(ack)
            if ack.is_ok()
                && ack.for_command == issued.command.code()
                && ack.for_sequence == issued.sequence =>
        {
            Correlation::Accepted
        }
        AckPayload::Structured(ack) => rejected(ack.status, ack.for_command, ack.for_sequence),
    }
}

fn rejected(status: u8, for_command: u8, for_sequence: u16) -> Correlation {
    Correlation::Rejected {
        status,
        for_command,
        for_sequence,
    }
}

#[cfg(test)]
mod tests {
    use linkprobe_payload::Ack;

    use super::*;

    fn ack(status: u8, for_command: CommandId, for_sequence: u16) -> Frame {
        Frame::new(
            CommandId::Ack,
            9,
            Ack::with_status(status, for_command.code(), for_sequence).encode(),
        )
    }

    #[test]
    fn matching_ack_is_accepted() {
        let issued = Issued::new(CommandId::Ping, 1);
        assert_eq!(
            correlate(&issued, &ack(0, CommandId::Ping, 1)),
            Correlation::Accepted
        );
    }

    #[test]
    fn legacy_ack_is_accepted() {
        let issued = Issued::new(CommandId::WriteMem, 4);
        let frame = Frame::new(CommandId::Ack, 1, Vec::new());
        assert_eq!(correlate(&issued, &frame), Correlation::Accepted);
        let short = Frame::new(CommandId::Ack, 1, vec![0, 0x12]);
        assert_eq!(correlate(&issued, &short), Correlation::Accepted);
    }

    #[test]
    fn nonzero_status_is_rejected() {
        let issued = Issued::new(CommandId::SetStreamConfig, 2);
        assert_eq!(
            correlate(&issued, &ack(1, CommandId::SetStreamConfig, 2)),
            Correlation::Rejected {
                status: 1,
                for_command: 0x05,
                for_sequence: 2
            }
        );
    }

    #[test]
    fn ack_for_other_command_or_sequence_is_rejected() {
        let issued = Issued::new(CommandId::StreamStart, 7);
        assert!(matches!(
            correlate(&issued, &ack(0, CommandId::Ping, 7)),
            Correlation::Rejected { .. }
        ));
        assert!(matches!(
            correlate(&issued, &ack(0, CommandId::StreamStart, 6)),
            Correlation::Rejected { .. }
        ));
    }

    #[test]
    fn other_commands_are_not_matches() {
        let issued = Issued::new(CommandId::Ping, 1);
        let stream = Frame::new(CommandId::StreamData, 1, vec![0u8; 14]);
        assert_eq!(correlate(&issued, &stream), Correlation::NotAMatch);
        let unknown = Frame::new(0x7Fu8, 1, Vec::new());
        assert_eq!(correlate(&issued, &unknown), Correlation::NotAMatch);
    }

    #[test]
    fn reply_in_kind_matches_own_code() {
        let issued = Issued::new(CommandId::GetVarTable, 3);
        let reply = Frame::new(CommandId::GetVarTable, 40, b"a,0x1,float32,1,V".to_vec());
        assert_eq!(correlate(&issued, &reply), Correlation::Accepted);

        // Acks do not answer a table request, unless they reject it.
        let legacy = Frame::new(CommandId::Ack, 1, Vec::new());
        assert_eq!(correlate(&issued, &legacy), Correlation::NotAMatch);
        assert_eq!(
            correlate(&issued, &ack(0, CommandId::GetVarTable, 3)),
            Correlation::NotAMatch
        );
        assert!(matches!(
            correlate(&issued, &ack(2, CommandId::GetVarTable, 3)),
            Correlation::Rejected { status: 2, .. }
        ));
    }
}
