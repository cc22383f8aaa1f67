use beacon_core::IceServerConfig;
use std::time::Duration;

/// Linear backoff for the viewer's reconnection controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Delay before attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(2000),
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub reconnect: ReconnectPolicy,
    pub join_timeout: Duration,
    pub create_timeout: Duration,
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            join_timeout: Duration::from_secs(10),
            create_timeout: Duration::from_secs(10),
            ice_servers: vec![IceServerConfig::stun("stun:stun.l.google.com:19302")],
        }
    }
}
