//! Message type tags of the speed daemon wire protocol.
//!
//! Every frame starts with one of these bytes. Tags in the `0x1_`, `0x2_` and
//! `0x4_` ranges carry data, `0x8_` tags identify the client role.

/// Error message sent by the server right before it closes a connection (Server->Client)
pub const MSG_ERROR: u8 = 0x10;

/// Number plate observation report (Client->Server)
pub const MSG_PLATE: u8 = 0x20;

/// Speed violation ticket (Server->Client)
pub const MSG_TICKET: u8 = 0x21;

/// Heartbeat request, interval in deciseconds (Client->Server)
pub const MSG_WANT_HEARTBEAT: u8 = 0x40;

/// Heartbeat tick (Server->Client)
pub const MSG_HEARTBEAT: u8 = 0x41;

/// Camera identification message (Client->Server)
pub const MSG_IAM_CAMERA: u8 = 0x80;

/// Dispatcher identification message (Client->Server)
pub const MSG_IAM_DISPATCHER: u8 = 0x81;

/// Strings are prefixed by a single length byte.
pub const MAX_STR_LEN: usize = u8::MAX as usize;

/// Human readable name of a tag, used in log lines.
pub fn tag_name(tag: u8) -> &'static str {
    match tag {
        MSG_ERROR => "Error",
        MSG_PLATE => "Plate",
        MSG_TICKET => "Ticket",
        MSG_WANT_HEARTBEAT => "WantHeartbeat",
        MSG_HEARTBEAT => "Heartbeat",
        MSG_IAM_CAMERA => "IAmCamera",
        MSG_IAM_DISPATCHER => "IAmDispatcher",
        _ => "Unknown",
    }
}
