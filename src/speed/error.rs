use std::time::Duration;

use thiserror::Error;

use super::protocol::ParseError;

/// A client broke the protocol. The `Display` text is what the client
/// receives in its `Error` frame before the connection is closed.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("already registered")]
    AlreadyIdentified,
    #[error("not a camera")]
    NotCamera,
    #[error("already requested heartbeat")]
    DuplicateHeartbeatRequest,
    #[error("{0}")]
    Malformed(#[from] ParseError),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),
    #[error("{remaining} connection(s) still open after {deadline:?}, aborted")]
    ShutdownTimeout { remaining: usize, deadline: Duration },
}

#[derive(Debug, Error)]
#[error("registry is no longer running")]
pub struct RegistryClosed;

/// Why a connection handler stopped.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Registry(#[from] RegistryClosed),
}
