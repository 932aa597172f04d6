use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 1883;

/// Client ids the broker client accepts: not empty, no leading space
pub fn valid_client_id(client_id: &str) -> bool {
    !client_id.is_empty() && !client_id.starts_with(' ')
}

/// Broker connection settings
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// 0 keeps fail-fast behaviour on connection loss
    pub reconnect_attempts: u32,
    pub reconnect_backoff_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            client_id: format!("sensor-gateway-{}", std::process::id()),
            keep_alive_secs: 5,
            reconnect_attempts: 0,
            reconnect_backoff_ms: 500,
        }
    }
}

impl MqttConfig {
    /// Replaces host and port from a `host[:port]` string
    pub fn set_server(&mut self, url: &str) -> Result<(), GatewayError> {
        let server_comps: Vec<&str> = url.split(':').collect();
        let host = server_comps.first().copied().unwrap_or_default();
        if host.is_empty() || server_comps.len() > 2 {
            return Err(GatewayError::Config(format!("Invalid broker address '{}'", url)));
        }
        let port = match server_comps.get(1) {
            Some(port) => port.parse().map_err(|e| {
                GatewayError::Config(format!("Invalid broker port '{}': {}", port, e))
            })?,
            None => DEFAULT_PORT,
        };
        self.host = host.to_string();
        self.port = port;
        Ok(())
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Delay before reconnect attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.reconnect_backoff_ms.saturating_mul(factor))
    }
}
