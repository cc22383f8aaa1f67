use beacon_core::IceServerConfig;
use clap::Parser;
use std::net::SocketAddr;

const DEFAULT_STUN: &str = "stun:stun.l.google.com:19302";

/// Signaling relay settings.
#[derive(Debug, Clone, Parser)]
#[command(name = "beacon-server", version, about = "Signaling relay for one-to-many live streams")]
pub struct ServerConfig {
    /// Address the WebSocket endpoint listens on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Hand out the fixed room identifier "dev-room-001" on every create.
    #[arg(long)]
    pub dev_mode: bool,

    /// STUN/TURN URL announced to clients. May be repeated.
    #[arg(long = "ice-server", default_value = DEFAULT_STUN)]
    pub ice_servers: Vec<String>,
}

impl ServerConfig {
    pub fn ice_config(&self) -> Vec<IceServerConfig> {
        self.ice_servers
            .iter()
            .map(|url| IceServerConfig::stun(url.clone()))
            .collect()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            dev_mode: false,
            ice_servers: vec![DEFAULT_STUN.to_owned()],
        }
    }
}
