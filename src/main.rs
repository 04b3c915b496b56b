use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use speed_daemon::speed::{Server, ServerConfig};

/// Average speed enforcement server for road cameras and ticket dispatchers.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Seconds to wait for open connections on shutdown
    #[arg(long, default_value_t = 5)]
    shutdown_timeout: u64,

    /// Registry inbox size; connections wait when it is full
    #[arg(long, default_value_t = 1024)]
    inbox_capacity: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            addr: SocketAddr::new(args.host, args.port),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            inbox_capacity: args.inbox_capacity,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig::from(args);
    let server = Server::bind(config.clone())
        .await
        .with_context(|| format!("could not listen on {}", config.addr))?;

    server
        .run(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("interrupt received"),
                Err(e) => {
                    tracing::error!(error = %e, "cannot listen for interrupt");
                    std::future::pending::<()>().await
                }
            }
        })
        .await?;

    info!("server exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let config = ServerConfig::from(Args::parse_from(["speed-daemon"]));
        assert_eq!(config.addr, "0.0.0.0:8000".parse().unwrap());
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.inbox_capacity, 1024);
    }

    #[test]
    fn test_port_flag() {
        let config = ServerConfig::from(Args::parse_from([
            "speed-daemon",
            "-p",
            "9000",
            "--host",
            "127.0.0.1",
            "--shutdown-timeout",
            "1",
        ]));
        assert_eq!(config.addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }
}
