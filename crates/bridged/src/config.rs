//! Gateway configuration

use std::time::Duration;

use bridgecore::UpstreamConfig;

/// Runtime configuration for the gateway daemon
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the WebSocket listener binds to
    pub listen_addr: String,
    /// Game server host
    pub upstream_host: String,
    /// Game server port
    pub upstream_port: u16,
    /// Period of the cooperative I/O tick
    pub tick_interval: Duration,
    /// Per-session upstream connection settings
    pub upstream: UpstreamConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            upstream_host: "3k.org".to_string(),
            upstream_port: 3000,
            tick_interval: Duration::from_millis(50),
            upstream: UpstreamConfig::default(),
        }
    }
}
