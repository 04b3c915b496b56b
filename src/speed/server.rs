//! TCP listener and server lifecycle.

use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time;
use tracing::{error, info, warn};

use super::connection;
use super::error::ServerError;
use super::registry::Registry;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// How long `run` waits for open connections after the shutdown signal.
    pub shutdown_timeout: Duration,
    /// Bound of the registry inbox.
    pub inbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8000)),
            shutdown_timeout: Duration::from_secs(5),
            inbox_capacity: 1024,
        }
    }
}

pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.addr)
            .await
            .map_err(ServerError::Bind)?;
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept clients until `signal` completes, then close every connection.
    ///
    /// Connections still running after `shutdown_timeout` are aborted and
    /// reported as [`ServerError::ShutdownTimeout`].
    pub async fn run(self, signal: impl Future<Output = ()>) -> Result<(), ServerError> {
        let Server { listener, config } = self;
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "listening");
        }

        let (registry, registry_task) = Registry::start(config.inbox_capacity);
        let (stop, stopped) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let (reader, writer) = stream.into_split();
                        connections.spawn(connection::handle(
                            reader,
                            writer,
                            peer,
                            registry.clone(),
                            stopped.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        error!(error = %e, "connection task failed");
                    }
                }
            }
        }

        info!(active = connections.len(), "server shutting down");
        drop(listener);
        drop(registry);
        let _ = stop.send(true);

        drain(connections, config.shutdown_timeout).await?;

        if let Err(e) = registry_task.await {
            error!(error = %e, "registry task failed");
        }
        info!("server stopped");
        Ok(())
    }
}

/// Wait for every connection task to finish, aborting the rest once
/// `deadline` has passed.
async fn drain(mut connections: JoinSet<()>, deadline: Duration) -> Result<(), ServerError> {
    let finished = time::timeout(deadline, async {
        while connections.join_next().await.is_some() {}
    })
    .await;

    if finished.is_err() {
        let remaining = connections.len();
        connections.abort_all();
        return Err(ServerError::ShutdownTimeout {
            remaining,
            deadline,
        });
    }
    Ok(())
}
