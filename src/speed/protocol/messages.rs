//! Typed messages of the speed daemon protocol.
//!
//! One variant per frame type. Client->Server variants are produced by
//! [`parse`](super::parse), Server->Client variants are written with
//! [`Message::encode`].

use std::time::Duration;

use super::constants::*;

/// Every frame that can cross the wire.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Message {
    Error(Error),
    Plate(Plate),
    Ticket(Ticket),
    WantHeartbeat(WantHeartbeat),
    Heartbeat,
    IAmCamera(IAmCamera),
    IAmDispatcher(IAmDispatcher),
}

impl Message {
    pub fn error(msg: impl Into<String>) -> Self {
        Message::Error(Error { msg: msg.into() })
    }

    pub fn tag(&self) -> u8 {
        match self {
            Message::Error(_) => MSG_ERROR,
            Message::Plate(_) => MSG_PLATE,
            Message::Ticket(_) => MSG_TICKET,
            Message::WantHeartbeat(_) => MSG_WANT_HEARTBEAT,
            Message::Heartbeat => MSG_HEARTBEAT,
            Message::IAmCamera(_) => MSG_IAM_CAMERA,
            Message::IAmDispatcher(_) => MSG_IAM_DISPATCHER,
        }
    }

    /// An `Error` frame is always the last frame on a connection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Message::Error(_))
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Error {
    pub msg: String,
}

/// A camera saw `plate` at `timestamp` (seconds since the UNIX epoch).
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Plate {
    pub plate: String,
    pub timestamp: u32,
}

/// Average speed violation between two sightings. `speed` is in
/// hundredths of a mile per hour.
#[derive(PartialEq, Eq, Debug, Clone, Hash)]
pub struct Ticket {
    pub plate: String,
    pub road: u16,
    pub mile1: u16,
    pub timestamp1: u32,
    pub mile2: u16,
    pub timestamp2: u32,
    pub speed: u16,
}

/// Heartbeat request, `interval` is in deciseconds.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct WantHeartbeat {
    pub interval: u32,
}

impl WantHeartbeat {
    /// `None` when the client asked for no heartbeats.
    pub fn period(&self) -> Option<Duration> {
        if self.interval == 0 {
            None
        } else {
            Some(Duration::from_millis(u64::from(self.interval) * 100))
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub struct IAmCamera {
    pub road: u16,
    pub mile: u16,
    pub limit: u16,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct IAmDispatcher {
    /// On the wire the count is a single byte, so at most 255 roads encode.
    pub roads: Vec<u16>,
}

impl IAmDispatcher {
    pub fn new(roads: Vec<u16>) -> Self {
        Self { roads }
    }
}
