//! One task per accepted socket.
//!
//! The read half is decoded and checked against the client's role here.
//! All writes go through a single writer task fed by an unbounded queue, so
//! heartbeats, tickets from the registry and the final `Error` frame never
//! interleave on the wire.
//!
//! When a client goes away the writer keeps draining its queue until the
//! registry has dropped its sender. Tickets it could not write are handed
//! back to the registry.

use std::collections::BTreeSet;
use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use super::client::{ClientId, ClientState, ClientType, next_client_id, validate_message};
use super::db::Outbound;
use super::error::{ConnectionError, ProtocolError};
use super::heartbeat::Heartbeat;
use super::protocol::{self, Message, ParseError, Ticket, tag_name};
use super::registry::RegistryHandle;
use super::ticket::Sighting;

const READ_CHUNK: usize = 1024;

struct Connection {
    state: ClientState,
    registry: RegistryHandle,
    outbound: Outbound,
    heartbeat: Option<Heartbeat>,
    buffer: Vec<u8>,
}

/// Serve one client until it disconnects, breaks the protocol, or
/// `shutdown` flips to `true`.
pub async fn handle<R, W>(
    mut reader: R,
    writer: W,
    peer: SocketAddr,
    registry: RegistryHandle,
    mut shutdown: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let id = next_client_id();
    let span = info_span!("client", id, %peer);

    async move {
        info!("client connected");
        let (outbound, outbound_rx) = unbounded_channel();
        // Aborts the writer if this task is dropped mid-drain
        let mut writer_task = JoinSet::new();
        writer_task.spawn(write_loop(writer, outbound_rx, id).in_current_span());

        let mut conn = Connection {
            state: ClientState::new(id),
            registry,
            outbound,
            heartbeat: None,
            buffer: Vec::with_capacity(READ_CHUNK),
        };

        let outcome = conn.run(&mut reader, &mut shutdown).await;
        drop(conn.heartbeat.take());

        match &outcome {
            Ok(()) => info!(role = conn.state.role(), "client disconnected"),
            Err(ConnectionError::Protocol(reason)) => {
                warn!(role = conn.state.role(), %reason, "protocol error, closing");
                let _ = conn.outbound.send(Message::error(reason.to_string()));
            }
            Err(ConnectionError::Io(e)) => warn!(error = %e, "connection dropped"),
            Err(ConnectionError::Registry(e)) => error!(error = %e, "closing client"),
        }

        let Connection {
            state,
            registry,
            outbound,
            ..
        } = conn;
        drop(outbound);
        if let Err(e) = registry.deregister(id, state.client_type.as_ref()).await {
            error!(error = %e, "failed to deregister");
        }

        // The queue ends once the registry has dropped this client's sender
        let unsent = match writer_task.join_next().await {
            Some(Ok(WriterExit { result, unsent })) => {
                if let Err(e) = result {
                    debug!(error = %e, "writer stopped early");
                }
                unsent
            }
            Some(Err(e)) => {
                error!(error = %e, "writer task failed");
                Vec::new()
            }
            None => Vec::new(),
        };

        if !unsent.is_empty() {
            info!(count = unsent.len(), "returning undelivered tickets");
            if let Err(e) = registry.requeue(unsent).await {
                error!(error = %e, "failed to requeue tickets");
            }
        }
    }
    .instrument(span)
    .await
}

impl Connection {
    async fn run<R>(
        &mut self,
        reader: &mut R,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), ConnectionError>
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            while let Some(message) = self.next_buffered()? {
                self.process(message).await?;
            }

            let n = tokio::select! {
                n = reader.read(&mut chunk) => n?,
                _ = shutdown.wait_for(|stop| *stop) => {
                    debug!("server shutting down");
                    return Ok(());
                }
            };

            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(());
                }
                return Err(ProtocolError::from(ParseError::Truncated).into());
            }
            trace!(bytes = %hex::encode(&chunk[..n]), "read");
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Take one complete message off the front of the buffer.
    fn next_buffered(&mut self) -> Result<Option<Message>, ProtocolError> {
        match protocol::parse(&self.buffer) {
            Ok((message, consumed)) => {
                self.buffer.drain(..consumed);
                Ok(Some(message))
            }
            Err(ParseError::InsufficientData) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn process(&mut self, message: Message) -> Result<(), ConnectionError> {
        trace!(msg = tag_name(message.tag()), "received");
        validate_message(&message, &self.state)?;

        match message {
            Message::IAmCamera(camera) => {
                self.registry.register_camera(self.id(), camera).await?;
                self.state.client_type = Some(ClientType::Camera(camera));
            }
            Message::IAmDispatcher(dispatcher) => {
                let roads: BTreeSet<u16> = dispatcher.roads.into_iter().collect();
                self.registry
                    .register_dispatcher(self.id(), roads.clone(), self.outbound.clone())
                    .await?;
                self.state.client_type = Some(ClientType::Dispatcher { roads });
            }
            Message::Plate(plate) => {
                let Some(camera) = self.state.camera() else {
                    return Err(ProtocolError::NotCamera.into());
                };
                let sighting = Sighting {
                    plate: plate.plate,
                    road: camera.road,
                    mile: camera.mile,
                    limit: camera.limit,
                    timestamp: plate.timestamp,
                };
                self.registry.record_sighting(sighting).await?;
            }
            Message::WantHeartbeat(request) => {
                self.state.has_heartbeat = true;
                if let Some(period) = request.period() {
                    debug!(?period, "heartbeat armed");
                    self.heartbeat = Some(Heartbeat::start(period, self.outbound.clone()));
                }
            }
            other @ (Message::Error(_) | Message::Ticket(_) | Message::Heartbeat) => {
                return Err(ProtocolError::from(ParseError::InvalidMessageType(other.tag())).into());
            }
        }
        Ok(())
    }

    fn id(&self) -> ClientId {
        self.state.id
    }
}

struct WriterExit {
    result: io::Result<()>,
    /// Tickets that never made it onto the socket, oldest first.
    unsent: Vec<Ticket>,
}

/// Drain the outbound queue onto the socket. Stops after an `Error` frame,
/// a failed write, or once every sender is gone.
async fn write_loop<W>(
    mut writer: W,
    mut outbound: UnboundedReceiver<Message>,
    id: ClientId,
) -> WriterExit
where
    W: AsyncWrite + Unpin,
{
    let mut unsent = Vec::new();
    let result = write_frames(&mut writer, &mut outbound, id, &mut unsent).await;

    // Registry sends fail from here on, so nothing new lands in the queue
    outbound.close();
    while let Some(message) = outbound.recv().await {
        if let Message::Ticket(ticket) = message {
            unsent.push(ticket);
        }
    }
    WriterExit { result, unsent }
}

async fn write_frames<W>(
    writer: &mut W,
    outbound: &mut UnboundedReceiver<Message>,
    id: ClientId,
    unsent: &mut Vec<Ticket>,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbound.recv().await {
        let bytes = message.encode()?;
        trace!(client_id = id, bytes = %hex::encode(&bytes), "write");
        if let Err(e) = writer.write_all(&bytes).await {
            if let Message::Ticket(ticket) = message {
                unsent.push(ticket);
            }
            return Err(e);
        }
        if message.is_terminal() {
            break;
        }
    }
    writer.flush().await?;
    writer.shutdown().await
}
