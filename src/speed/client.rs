//! Per-connection role state.
//!
//! A client starts out unidentified, declares itself as a camera or a
//! dispatcher at most once, and may ask for heartbeats at most once.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use super::error::ProtocolError;
use super::protocol::{IAmCamera, Message};

/// Process-unique connection id, used as the registry key.
pub type ClientId = u64;

pub static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

pub fn next_client_id() -> ClientId {
    CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Types of clients that can connect to the server
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum ClientType {
    /// Camera client that reports plate observations
    Camera(IAmCamera),
    /// Dispatcher client that receives tickets for specific roads
    Dispatcher { roads: BTreeSet<u16> },
}

/// Tracks the current state of a client connection
#[derive(Debug)]
pub struct ClientState {
    pub id: ClientId,
    /// Client type and details (None until they identify themselves)
    pub client_type: Option<ClientType>,
    /// Whether client has sent a WantHeartbeat, including interval 0
    pub has_heartbeat: bool,
}

impl ClientState {
    pub fn new(id: ClientId) -> Self {
        Self {
            id,
            client_type: None,
            has_heartbeat: false,
        }
    }

    /// Check if the client has identified itself.
    pub fn is_identified(&self) -> bool {
        self.client_type.is_some()
    }

    pub fn camera(&self) -> Option<IAmCamera> {
        match self.client_type {
            Some(ClientType::Camera(camera)) => Some(camera),
            _ => None,
        }
    }

    pub fn role(&self) -> &'static str {
        match self.client_type {
            None => "unassigned",
            Some(ClientType::Camera(_)) => "camera",
            Some(ClientType::Dispatcher { .. }) => "dispatcher",
        }
    }
}

/// Check that `message` is allowed in the client's current state.
///
/// Does not change the state; `connection.rs` applies the transition once
/// the registry has accepted the matching event.
pub fn validate_message(message: &Message, state: &ClientState) -> Result<(), ProtocolError> {
    match message {
        Message::IAmCamera(_) | Message::IAmDispatcher(_) if state.is_identified() => {
            Err(ProtocolError::AlreadyIdentified)
        }
        Message::Plate(_) if state.camera().is_none() => Err(ProtocolError::NotCamera),
        Message::WantHeartbeat(_) if state.has_heartbeat => {
            Err(ProtocolError::DuplicateHeartbeatRequest)
        }
        _ => Ok(()),
    }
}
