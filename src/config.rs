//! Command line and environment configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;

use crate::hub::DEFAULT_PORT;

const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(author, version, about = "Room-based signaling and relay hub", long_about = None)]
pub struct Cli {
    /// Address to bind to.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to listen on. Use 0 for an ephemeral port.
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Seconds between WebSocket pings.
    #[arg(long, default_value_t = DEFAULT_PING_INTERVAL.as_secs())]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before dropping the connection.
    #[arg(long, default_value_t = DEFAULT_PONG_TIMEOUT.as_secs())]
    pub pong_timeout_secs: u64,
}

impl Cli {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            ping_interval: Duration::from_secs(self.ping_interval_secs.max(1)),
            pong_timeout: Duration::from_secs(self.pong_timeout_secs.max(1)),
        }
    }
}

/// Per-connection transport settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            pong_timeout: DEFAULT_PONG_TIMEOUT,
        }
    }
}
