//! Speed camera enforcement server.
//!
//! Cameras report plates, the registry correlates sightings per plate and
//! road, and tickets are routed to whichever dispatcher covers the road.

pub mod client;
pub mod connection;
pub mod db;
pub mod error;
pub mod heartbeat;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod ticket;


pub use error::{ProtocolError, ServerError};
pub use server::{Server, ServerConfig};
