//! Binary protocol parsing for the speed daemon.
//!
//! This module turns buffered bytes from a client into [`Message`]s.
//! The protocol uses big-endian integers and `u8` length-prefixed strings.
//!
//! # Error Handling
//!
//! Parsing errors are distinct from protocol validation errors:
//! - [`ParseError::InsufficientData`] is not a failure, the caller reads
//!   more bytes and tries again
//! - every other [`ParseError`] is fatal for the connection
//! - role checks (who may send what) live in `client.rs`
//!
//! # Message Format
//!
//! ```text
//! +--------+------------------+
//! | Type   | Message Data     |
//! | (u8)   | (variable)       |
//! +--------+------------------+
//! ```

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use super::{constants::*, messages::*};

/// Errors that can occur when parsing binary protocol data.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Unknown tag, or a tag only the server is allowed to send
    #[error("illegal msg type 0x{0:02x}")]
    InvalidMessageType(u8),
    /// Not enough bytes buffered to complete the frame
    #[error("insufficient data")]
    InsufficientData,
    /// Plate string is not valid UTF-8
    #[error("invalid utf-8 in string")]
    InvalidUtf8,
    /// Connection closed in the middle of a frame
    #[error("truncated message")]
    Truncated,
}

/// Read a big-endian `u16` at the cursor, advancing it by 2 bytes.
fn read_u16_be(data: &[u8], cursor: &mut usize) -> Result<u16, ParseError> {
    let bytes = data
        .get(*cursor..*cursor + 2)
        .ok_or(ParseError::InsufficientData)?;
    *cursor += 2;
    Ok(BigEndian::read_u16(bytes))
}

/// Read a big-endian `u32` at the cursor, advancing it by 4 bytes.
fn read_u32_be(data: &[u8], cursor: &mut usize) -> Result<u32, ParseError> {
    let bytes = data
        .get(*cursor..*cursor + 4)
        .ok_or(ParseError::InsufficientData)?;
    *cursor += 4;
    Ok(BigEndian::read_u32(bytes))
}

fn read_u8(data: &[u8], cursor: &mut usize) -> Result<u8, ParseError> {
    let byte = *data.get(*cursor).ok_or(ParseError::InsufficientData)?;
    *cursor += 1;
    Ok(byte)
}

/// Read a length-prefixed string: `[length: u8][data: u8; length]`.
fn read_string(data: &[u8], cursor: &mut usize) -> Result<String, ParseError> {
    let len = read_u8(data, cursor)? as usize;

    let bytes = data
        .get(*cursor..*cursor + len)
        .ok_or(ParseError::InsufficientData)?;
    *cursor += len;

    String::from_utf8(bytes.to_vec()).map_err(|_| ParseError::InvalidUtf8)
}

/// Parse one complete client message from the front of `data`.
///
/// Returns the message and the number of bytes it occupied, so the caller
/// can drop them from its buffer. The tag is checked before the payload,
/// so an illegal tag is reported even when nothing else is buffered yet.
///
/// ```text
/// [0x20, 0x04, b'U', b'N', b'1', b'X', 0x00, 0x00, 0x03, 0xe8]
///   => (Message::Plate(Plate { plate: "UN1X", timestamp: 1000 }), 10)
/// ```
pub fn parse(data: &[u8]) -> Result<(Message, usize), ParseError> {
    let mut cursor = 0;
    let tag = read_u8(data, &mut cursor)?;

    let message = match tag {
        MSG_PLATE => parse_plate(data, &mut cursor)?,
        MSG_WANT_HEARTBEAT => parse_wantheartbeat(data, &mut cursor)?,
        MSG_IAM_CAMERA => parse_iamcamera(data, &mut cursor)?,
        MSG_IAM_DISPATCHER => parse_iamdispatcher(data, &mut cursor)?,
        // Error, Ticket and Heartbeat only ever travel Server->Client
        other => return Err(ParseError::InvalidMessageType(other)),
    };

    Ok((message, cursor))
}

fn parse_plate(data: &[u8], cursor: &mut usize) -> Result<Message, ParseError> {
    let plate = read_string(data, cursor)?;
    let timestamp = read_u32_be(data, cursor)?;

    Ok(Message::Plate(Plate { plate, timestamp }))
}

fn parse_wantheartbeat(data: &[u8], cursor: &mut usize) -> Result<Message, ParseError> {
    let interval = read_u32_be(data, cursor)?;

    Ok(Message::WantHeartbeat(WantHeartbeat { interval }))
}

fn parse_iamcamera(data: &[u8], cursor: &mut usize) -> Result<Message, ParseError> {
    let road = read_u16_be(data, cursor)?;
    let mile = read_u16_be(data, cursor)?;
    let limit = read_u16_be(data, cursor)?;

    Ok(Message::IAmCamera(IAmCamera { road, mile, limit }))
}

fn parse_iamdispatcher(data: &[u8], cursor: &mut usize) -> Result<Message, ParseError> {
    let numroads = read_u8(data, cursor)?;

    let mut roads = Vec::with_capacity(numroads as usize);
    for _ in 0..numroads {
        roads.push(read_u16_be(data, cursor)?);
    }

    Ok(Message::IAmDispatcher(IAmDispatcher { roads }))
}
