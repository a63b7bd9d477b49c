//! Command codes.
//!
//! The command set is fixed. Codes 0x01-0x05 are control commands answered
//! with `Ack`, 0x10-0x12 are data commands (`GetVarTable` and `ReadMemBatch`
//! reply on their own code), and 0x20 is the one-way stream frame.

use crate::error::FrameError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandId {
    Ping = 0x01,
    Ack = 0x02,
    StreamStart = 0x03,
    StreamStop = 0x04,
    SetStreamConfig = 0x05,
    GetVarTable = 0x10,
    ReadMemBatch = 0x11,
    WriteMem = 0x12,
    StreamData = 0x20,
}

impl CommandId {
    /// Wire code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Upper-case name used in logs and reports.
    pub const fn name(self) -> &'static str {
        match self {
            CommandId::Ping => "PING",
            CommandId::Ack => "ACK",
            CommandId::StreamStart => "STREAM_START",
            CommandId::StreamStop => "STREAM_STOP",
            CommandId::SetStreamConfig => "SET_STREAM_CONFIG",
            CommandId::GetVarTable => "GET_VAR_TABLE",
            CommandId::ReadMemBatch => "READ_MEM_BATCH",
            CommandId::WriteMem => "WRITE_MEM",
            CommandId::StreamData => "STREAM_DATA",
        }
    }

    /// True for requests whose response is a frame on the same command code
    /// rather than an `Ack`.
    pub const fn replies_in_kind(self) -> bool {
        matches!(self, CommandId::GetVarTable | CommandId::ReadMemBatch)
    }

    /// True for frames that are never answered.
    pub const fn is_one_way(self) -> bool {
        matches!(self, CommandId::Ack | CommandId::StreamData)
    }
}

impl From<CommandId> for u8 {
    fn from(id: CommandId) -> Self {
        id.code()
    }
}

impl TryFrom<u8> for CommandId {
    type Error = FrameError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0x01 => CommandId::Ping,
            0x02 => CommandId::Ack,
            0x03 => CommandId::StreamStart,
            0x04 => CommandId::StreamStop,
            0x05 => CommandId::SetStreamConfig,
            0x10 => CommandId::GetVarTable,
            0x11 => CommandId::ReadMemBatch,
            0x12 => CommandId::WriteMem,
            0x20 => CommandId::StreamData,
            other => return Err(FrameError::UnknownCommand(other)),
        })
    }
}

/// Name for a raw command byte, `"UNKNOWN"` outside the command set.
pub fn command_name(code: u8) -> &'static str {
    CommandId::try_from(code).map_or("UNKNOWN", CommandId::name)
}
