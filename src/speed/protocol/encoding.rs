//! Binary encoding of [`Message`]s.
//!
//! The server only sends `Error`, `Ticket` and `Heartbeat`, but every variant
//! can be encoded so tests can play the client side.

use std::io::{self, Write};

use byteorder::{BigEndian, WriteBytesExt};

use super::{constants::*, messages::*};

/// Write a length-prefixed string, cut to [`MAX_STR_LEN`] bytes.
fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    let bytes = &s.as_bytes()[..s.len().min(MAX_STR_LEN)];
    w.write_u8(bytes.len() as u8)?;
    w.write_all(bytes)
}

impl Message {
    /// Serialize this message into `w`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Message::Error(Error { msg }) => {
                w.write_u8(MSG_ERROR)?;
                write_string(w, msg)?;
            }
            Message::Plate(Plate { plate, timestamp }) => {
                w.write_u8(MSG_PLATE)?;
                write_string(w, plate)?;
                w.write_u32::<BigEndian>(*timestamp)?;
            }
            Message::Ticket(ticket) => {
                w.write_u8(MSG_TICKET)?;
                write_string(w, &ticket.plate)?;
                w.write_u16::<BigEndian>(ticket.road)?;
                w.write_u16::<BigEndian>(ticket.mile1)?;
                w.write_u32::<BigEndian>(ticket.timestamp1)?;
                w.write_u16::<BigEndian>(ticket.mile2)?;
                w.write_u32::<BigEndian>(ticket.timestamp2)?;
                w.write_u16::<BigEndian>(ticket.speed)?;
            }
            Message::WantHeartbeat(WantHeartbeat { interval }) => {
                w.write_u8(MSG_WANT_HEARTBEAT)?;
                w.write_u32::<BigEndian>(*interval)?;
            }
            Message::Heartbeat => w.write_u8(MSG_HEARTBEAT)?,
            Message::IAmCamera(IAmCamera { road, mile, limit }) => {
                w.write_u8(MSG_IAM_CAMERA)?;
                w.write_u16::<BigEndian>(*road)?;
                w.write_u16::<BigEndian>(*mile)?;
                w.write_u16::<BigEndian>(*limit)?;
            }
            Message::IAmDispatcher(IAmDispatcher { roads }) => {
                let numroads = u8::try_from(roads.len()).map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("{} roads do not fit in one IAmDispatcher", roads.len()),
                    )
                })?;
                w.write_u8(MSG_IAM_DISPATCHER)?;
                w.write_u8(numroads)?;
                for road in roads {
                    w.write_u16::<BigEndian>(*road)?;
                }
            }
        }
        Ok(())
    }

    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(16);
        self.write_to(&mut buf)?;
        Ok(buf)
    }
}
